#![no_main]

use libfuzzer_sys::fuzz_target;
use vobsub_codec::{subtitles, DecodeOptions};

fuzz_target!(|data: &[u8]| {
    let options = DecodeOptions::default();
    for sub in subtitles(data, &[]) {
        sub.render(&options);
    }
});
