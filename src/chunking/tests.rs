use super::*;

fn params(size: usize, overlap: usize, min_len: usize) -> ChunkParams {
    ChunkParams::new(size, overlap, min_len).expect("valid chunk params")
}

/// Deterministic pseudo-random text with words, spaces and paragraph breaks.
fn sample_text(len: usize, seed: u64) -> String {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut text = String::with_capacity(len);
    while text.chars().count() < len {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let c = match (state >> 33) % 20 {
            0..=2 => ' ',
            3 => '\n',
            4 => 'é',
            n => char::from(b'a' + u8::try_from(n).unwrap_or(0)),
        };
        text.push(c);
    }
    text
}

#[test]
fn rejects_overlap_not_smaller_than_size() {
    assert!(matches!(
        ChunkParams::new(100, 100, 10),
        Err(ConfigError::OverlapNotSmallerThanChunk {
            overlap: 100,
            size: 100
        })
    ));
    assert!(ChunkParams::new(100, 150, 10).is_err());
    assert!(matches!(
        ChunkParams::new(0, 0, 0),
        Err(ConfigError::InvalidChunkSize(0))
    ));
    assert_eq!(params(900, 150, 40).stride(), 750);
}

#[test]
fn thousand_char_document_yields_two_chunks() {
    let text = "x".repeat(1000);
    let chunks = chunk_text(&text, &params(900, 150, 40));

    assert_eq!(chunks.len(), 2);
    assert_eq!((chunks[0].start, chunks[0].end), (0, 900));
    assert_eq!((chunks[1].start, chunks[1].end), (750, 1000));
    assert_eq!(chunks[0].text.len(), 900);
    assert_eq!(chunks[1].text.len(), 250);
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = chunk_text("a short paragraph of text that is long enough", &params(900, 150, 10));
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].start, 0);
}

#[test]
fn empty_and_whitespace_text_yield_nothing() {
    assert!(chunk_text("", &params(900, 150, 0)).is_empty());
    assert!(chunk_document(" \t\n\n \r\n ", &params(900, 150, 0), 400_000).is_empty());
}

#[test]
fn trailing_window_below_min_len_is_dropped() {
    // Final window is [90, 110): 20 chars, below the 40 char floor.
    let text = "y".repeat(110);
    let chunks = chunk_text(&text, &params(100, 10, 40));
    assert_eq!(chunks.len(), 1);
    assert_eq!((chunks[0].start, chunks[0].end), (0, 100));

    let text = "y".repeat(920);
    let chunks = chunk_text(&text, &params(900, 150, 40));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].text.len(), 170);
}

#[test]
fn windows_cover_text_and_overlap_exactly() {
    for (len, size, overlap) in [(5000, 900, 150), (1234, 100, 99), (333, 50, 1), (64, 64, 10)] {
        let text = "z".repeat(len);
        let p = params(size, overlap, 1);
        let chunks = chunk_text(&text, &p);

        assert_eq!(chunks.first().map(|c| c.start), Some(0));
        assert_eq!(chunks.last().map(|c| c.end), Some(len));
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, overlap, "len={len} size={size}");
            assert!(pair[1].end > pair[0].end);
        }
        for chunk in &chunks {
            assert!(chunk.end - chunk.start <= size);
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = normalize_whitespace(&sample_text(10_000, 7));
    let p = params(300, 60, 20);
    assert_eq!(chunk_text(&text, &p), chunk_text(&text, &p));
}

#[test]
fn stream_matches_one_shot_for_any_segmentation() {
    let text = normalize_whitespace(&sample_text(7_500, 42));
    let p = params(400, 75, 30);
    let expected = chunk_text(&text, &p);

    for segment_chars in [1, 7, 64, 399, 400, 401, 4096] {
        let mut stream = ChunkStream::new(p);
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(segment_chars) {
            let piece: String = piece.iter().collect();
            stream.push(&piece, &mut chunks);
        }
        stream.finish(&mut chunks);
        assert_eq!(chunks, expected, "segment size {segment_chars}");
    }
}

#[test]
fn ranges_are_measured_in_characters() {
    let text = "ação ".repeat(100);
    let text = text.trim();
    let chunks = chunk_text(text, &params(50, 10, 5));
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 50);
    }
    assert_eq!(chunks.last().map(|c| c.end), Some(text.chars().count()));
}

#[test]
fn normalizes_whitespace_runs() {
    assert_eq!(normalize_whitespace("  a \t  b  "), "a b");
    assert_eq!(normalize_whitespace("a\r\nb\rc\nd"), "a\nb\nc\nd");
    assert_eq!(normalize_whitespace("a\n\n\n\n\nb"), "a\n\nb");
    assert_eq!(normalize_whitespace("a\r\n\r\n\r\nb"), "a\n\nb");
    assert_eq!(normalize_whitespace("a\n\nb"), "a\n\nb");
    assert_eq!(normalize_whitespace("\n\n  lead and trail \n\n"), "lead and trail");
    assert_eq!(normalize_whitespace("tab\u{a0}\u{2003}sep"), "tab sep");
}

#[test]
fn normalizer_is_segmentation_independent() {
    let raw = "one  two\r\n\r\n\r\nthree \t four\r\nfive\n\n\n\n six  ";
    let expected = normalize_whitespace(raw);
    for split in 0..raw.len() {
        if !raw.is_char_boundary(split) {
            continue;
        }
        let (left, right) = raw.split_at(split);
        let mut normalizer = WhitespaceNormalizer::new();
        let mut out = String::new();
        normalizer.push(left, &mut out);
        normalizer.push(right, &mut out);
        assert_eq!(out, expected, "split at {split}");
    }
}

#[test]
fn document_chunker_caps_characters() {
    let raw = "w ".repeat(1000);
    let p = params(100, 20, 1);
    let chunks = chunk_document(&raw, &p, 250);
    assert_eq!(chunks.last().map(|c| c.end), Some(250));

    let mut chunker = DocumentChunker::new(p, 250);
    let mut out = Vec::new();
    for _ in 0..10 {
        chunker.push(&"w ".repeat(100), &mut out);
    }
    assert!(chunker.is_saturated());
    chunker.finish(&mut out);
    assert_eq!(out, chunks);
}

#[test]
fn document_chunker_matches_normalize_then_chunk() {
    let raw = sample_text(6_000, 3).replace('\n', "\r\n\n");
    let p = params(500, 100, 40);
    let normalized = normalize_whitespace(&raw);
    assert_eq!(chunk_document(&raw, &p, usize::MAX), chunk_text(&normalized, &p));
}
