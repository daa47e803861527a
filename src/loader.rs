use log::{debug, warn};

use crate::error::VmError;
use crate::state::{RunState, MEMORY_MAX};

/// Where an image was placed in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    pub origin: u16,
    pub words: usize,
}

impl LoadedImage {
    /// One past the last address written, if it is still inside memory.
    pub fn end(&self) -> Option<u16> {
        u16::try_from(self.origin as usize + self.words).ok()
    }
}

/// Copy a big-endian program image into memory.
///
/// The image is a 2-byte origin followed by the words to place there, one after another. A trailing
/// odd byte is not part of any word and is ignored. Nothing is written unless the whole image fits.
pub fn load_image(state: &mut RunState, image: &[u8]) -> Result<LoadedImage, VmError> {
    if image.len() < 2 {
        return Err(VmError::MissingOrigin { len: image.len() });
    }
    let origin = u16::from_be_bytes([image[0], image[1]]);
    let body = &image[2..];
    let words = body.len() / 2;
    if body.len() % 2 != 0 {
        warn!("ignoring trailing byte of {}-byte image", image.len());
    }

    if origin as usize + words > MEMORY_MAX {
        return Err(VmError::ImageOverflow { origin, words });
    }

    let addrs = (origin as usize..).map(|addr| addr as u16);
    for (addr, word) in addrs.zip(body.chunks_exact(2)) {
        state.set_mem(addr, u16::from_be_bytes([word[0], word[1]]));
    }

    debug!("loaded {words} words at 0x{origin:04x}");
    Ok(LoadedImage { origin, words })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_words() {
        let mut state = RunState::default();
        let loaded = load_image(&mut state, &[0x30, 0x00, 0x12, 0x34, 0xF0, 0x25]).unwrap();
        assert_eq!(loaded, LoadedImage { origin: 0x3000, words: 2 });
        assert_eq!(loaded.end(), Some(0x3002));
        assert_eq!(state.mem(0x3000), 0x1234);
        assert_eq!(state.mem(0x3001), 0xF025);
        assert_eq!(state.mem(0x3002), 0);
    }

    #[test]
    fn origin_only() {
        let mut state = RunState::default();
        let loaded = load_image(&mut state, &[0x40, 0x00]).unwrap();
        assert_eq!(loaded.words, 0);
        assert_eq!(loaded.origin, 0x4000);
    }

    #[test]
    fn fills_to_last_address() {
        let mut state = RunState::default();
        let loaded = load_image(&mut state, &[0xFF, 0xFF, 0xAB, 0xCD]).unwrap();
        assert_eq!(state.mem(0xFFFF), 0xABCD);
        assert_eq!(loaded.end(), None);
    }

    #[test]
    fn rejects_overflow() {
        let mut state = RunState::default();
        let result = load_image(&mut state, &[0xFF, 0xFF, 0x11, 0x11, 0x22, 0x22]);
        assert!(matches!(
            result,
            Err(VmError::ImageOverflow {
                origin: 0xFFFF,
                words: 2
            })
        ));
        // Nothing written, not even the part that fit
        assert_eq!(state.mem(0xFFFF), 0);
        assert_eq!(state.mem(0x0000), 0);
    }

    #[test]
    fn rejects_malformed() {
        let mut state = RunState::default();
        assert!(matches!(
            load_image(&mut state, &[0x30]),
            Err(VmError::MissingOrigin { len: 1 })
        ));
        assert!(matches!(
            load_image(&mut state, &[]),
            Err(VmError::MissingOrigin { len: 0 })
        ));
    }

    #[test]
    fn ignores_trailing_byte() {
        let mut state = RunState::default();
        let loaded = load_image(&mut state, &[0x30, 0x00, 0x12]).unwrap();
        assert_eq!(loaded, LoadedImage { origin: 0x3000, words: 0 });
        assert_eq!(state.mem(0x3000), 0);

        let loaded = load_image(&mut state, &[0x30, 0x00, 0x12, 0x34, 0xAB]).unwrap();
        assert_eq!(loaded.words, 1);
        assert_eq!(state.mem(0x3000), 0x1234);
        assert_eq!(state.mem(0x3001), 0);
    }
}
