use std::{cell::RefCell, ffi::OsStr};

use crate::config::Policy;

/// Defaults taken from the process environment.
#[derive(Clone, Copy, Debug)]
struct Env {
    policy: Policy,
    trace: bool,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `LC3_POLICY` and `LC3_TRACE`. Must be called once, before any accessor.
///
/// An unset or unparseable `LC3_POLICY` falls back to the default policy. The environment is
/// initialized either way; an `Err` only reports why `LC3_POLICY` was ignored.
pub fn init() -> Result<(), String> {
    let parsed = match std::env::var("LC3_POLICY") {
        Ok(value) => value.parse::<Policy>().map(Some),
        Err(_) => Ok(None),
    };
    let value = Env {
        policy: parsed.clone().ok().flatten().unwrap_or_default(),
        trace: var_is("LC3_TRACE", "1"),
    };
    set_env(value);
    parsed.map(|_| ())
}

pub fn policy() -> Policy {
    with_env(|env| env.policy)
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
