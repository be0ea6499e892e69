#![no_main]

use libfuzzer_sys::fuzz_target;
use vobsub_codec::{sp_blocks, DecodeOptions, SpuImage};

fuzz_target!(|data: &[u8]| {
    let options = DecodeOptions::default();
    for (_, image) in sp_blocks(data) {
        image.render(&options);
    }
    if let Ok(image) = SpuImage::from_sp_packet(data) {
        image.render(&options);
    }
});
