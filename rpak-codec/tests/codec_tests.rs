//! Cross-codec integration tests.

use pretty_assertions::assert_eq;

use rpak_codec::{
    deflate_compress, deflate_decompress, pak_compress, pak_decompress, snowflake_compress,
    snowflake_decompress,
};

fn corpus() -> Vec<Vec<u8>> {
    let mut samples = vec![
        Vec::new(),
        b"a".to_vec(),
        b"short sample".to_vec(),
        vec![0u8; 4096],
        (0..=255u8).cycle().take(2048).collect(),
    ];
    // Mixed structured content: repeated record-ish runs with a counter.
    let mut structured = Vec::new();
    for i in 0..512u32 {
        structured.extend_from_slice(&i.to_le_bytes());
        structured.extend_from_slice(b"asset_name_");
        structured.extend_from_slice(format!("{:03}", i % 23).as_bytes());
        structured.push(0);
    }
    samples.push(structured);
    samples
}

#[test]
fn test_pak_codec_roundtrips_corpus() {
    for (i, sample) in corpus().iter().enumerate() {
        let compressed = pak_compress(sample, 16).unwrap();
        assert_eq!(&pak_decompress(&compressed, 0).unwrap(), sample, "sample {i}");
    }
}

#[test]
fn test_deflate_adapter_roundtrips_corpus() {
    for (i, sample) in corpus().iter().enumerate() {
        let compressed = deflate_compress(sample).unwrap();
        assert_eq!(
            &deflate_decompress(&compressed, sample.len()).unwrap(),
            sample,
            "sample {i}"
        );
    }
}

#[test]
fn test_snowflake_roundtrips_corpus() {
    for (i, sample) in corpus().iter().enumerate() {
        let compressed = snowflake_compress(sample, 16).unwrap();
        assert_eq!(
            &snowflake_decompress(&compressed, 0).unwrap(),
            sample,
            "sample {i}"
        );
    }
}

#[test]
fn test_deflate_known_fixture() {
    // A raw deflate stored block: BFINAL=1/BTYPE=00, LEN, NLEN, bytes.
    let fixture = [0x01, 0x02, 0x00, 0xFD, 0xFF, b'h', b'i'];
    assert_eq!(deflate_decompress(&fixture, 2).unwrap(), b"hi");
}

#[test]
fn test_codecs_are_deterministic() {
    let sample = corpus().pop().unwrap();
    assert_eq!(pak_compress(&sample, 12).unwrap(), pak_compress(&sample, 12).unwrap());
    assert_eq!(
        snowflake_compress(&sample, 12).unwrap(),
        snowflake_compress(&sample, 12).unwrap()
    );
}

#[test]
fn test_truncation_never_panics() {
    let sample = corpus().pop().unwrap();
    let pak = pak_compress(&sample, 12).unwrap();
    let snow = snowflake_compress(&sample, 12).unwrap();
    for cut in [0, 1, 5, pak.len() / 2, pak.len().saturating_sub(1)] {
        let _ = pak_decompress(&pak[..cut.min(pak.len())], 0);
    }
    for cut in [0, 1, 5, snow.len() / 2, snow.len().saturating_sub(1)] {
        let _ = snowflake_decompress(&snow[..cut.min(snow.len())], 0);
    }
}
