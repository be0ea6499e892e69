use log::debug;
use std::fs;
use std::path::Path;

use vobsub_codec::{sp_blocks, subtitles, DecodeOptions, Index};

fn glob_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

// To run this test, use `cargo test -- --ignored`.  This tests against a
// larger selection of *.idx/*.sub pairs in a private corpus, which is
// unfortunately not open source.
#[test]
#[ignore]
fn private_corpus() {
    let _ = env_logger::builder().is_test(true).try_init();
    for entry in glob::glob_with("../private/**/*.idx", glob_options()).unwrap() {
        let path = entry.unwrap();
        debug!("Processing {}", path.display());
        let index = Index::open(&path).unwrap();
        let options = index.decode_options();
        let count = index
            .subtitles()
            .map(|sub| {
                let rendered = sub.render(&options);
                assert!(rendered.image.width() > 0);
                assert!(sub.end >= sub.start);
            })
            .count();
        debug!("Found {} subtitles", count);
    }
}

// Damaged inputs, mostly found by `cargo fuzz`.  None of them may panic,
// and every subtitle we get back must render.
#[test]
fn damaged_corpus() {
    let _ = env_logger::builder().is_test(true).try_init();
    for entry in glob::glob_with("fixtures/invalid/*", glob_options()).unwrap() {
        process_file(&entry.unwrap());
    }
}

fn process_file(path: &Path) {
    debug!("Processing {}", path.display());
    let buffer = fs::read(path).unwrap();
    let options = DecodeOptions::default();
    let count = subtitles(&buffer, &[])
        .map(|sub| sub.render(&options))
        .count();
    let sp_count = sp_blocks(&buffer)
        .map(|(_, image)| image.render(&options))
        .count();
    debug!("Found {} subtitles and {} SP blocks", count, sp_count);
}

#[test]
fn damaged_inputs_in_memory() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let inputs: &[&[u8]] = &[
        b"",
        &[0x00, 0x00, 0x01],
        &[0x00, 0x00, 0x01, 0xba, 0x44],
        &[0x00, 0x00, 0x01, 0xbd, 0xff, 0xff, 0x81, 0x80, 0x05, 0x21],
        &[0x00, 0x00, 0x01, 0xbd, 0x00, 0x08, 0x81, 0x00, 0x00, 0x20, 0x00, 0x04, 0xff, 0xff],
        b"SP\x00\x00\x00\x00\x00\x00\x00\x00\xff\xff\x00\x00",
    ];
    for (i, input) in inputs.iter().enumerate() {
        let path = dir.path().join(format!("damaged-{}.sub", i));
        fs::write(&path, input).unwrap();
        process_file(&path);
    }
}
