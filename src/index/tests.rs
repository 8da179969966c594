use super::*;
use tempfile::TempDir;

fn record(id: &str, text: &str, source: &str) -> ChunkRecord {
    ChunkRecord {
        id: id.to_string(),
        text: text.to_string(),
        source: source.to_string(),
    }
}

fn sample_index() -> KnowledgeIndex {
    KnowledgeIndex {
        model: "text-embedding-3-small".to_string(),
        chunks: vec![
            record("a1", "first chunk", "a.txt"),
            record("a2", "second \"quoted\" chunk", "a.txt"),
            record("b1", "third chunk", "b.md"),
        ],
        vectors: vec![vec![1.0, 0.0], vec![0.5, -0.25], vec![0.0, 1.0]],
    }
}

#[test]
fn writer_output_loads_back_in_order() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("kb_index.json");
    let index = sample_index();

    let mut writer = IndexWriter::create(&path, &index.model).expect("should create writer");
    writer
        .append(&index.chunks[..2], &index.vectors[..2])
        .expect("first batch");
    writer
        .append(&index.chunks[2..], &index.vectors[2..])
        .expect("second batch");
    assert_eq!(writer.len(), 3);
    let written = writer.finish().expect("should finish");

    assert_eq!(written, path);
    assert_eq!(KnowledgeIndex::load(&path).expect("should load"), index);
}

#[test]
fn file_has_the_documented_top_level_keys() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("index.json");
    sample_index().save(&path).expect("should save");

    let raw = fs::read_to_string(&path).expect("should read");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    let object = value.as_object().expect("top level object");
    assert_eq!(object.len(), 3);
    assert_eq!(object["model"], "text-embedding-3-small");
    assert_eq!(object["chunks"][1]["source"], "a.txt");
    assert_eq!(object["chunks"][1]["id"], "a2");
    assert_eq!(object["vectors"].as_array().map(Vec::len), Some(3));
}

#[test]
fn empty_writer_produces_a_valid_empty_index() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("empty.json");
    let writer = IndexWriter::create(&path, "m").expect("should create writer");
    assert!(writer.is_empty());
    writer.finish().expect("should finish");

    let index = KnowledgeIndex::load(&path).expect("should load");
    assert!(index.is_empty());
    assert_eq!(index.dimension(), None);
}

#[test]
fn missing_parent_directories_are_created() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("kb").join("nested").join("index.json");
    sample_index().save(&path).expect("should save");
    assert!(path.is_file());
}

#[test]
fn finish_replaces_an_existing_file() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("index.json");
    fs::write(&path, "old contents").expect("should write");

    sample_index().save(&path).expect("should save");
    assert_eq!(KnowledgeIndex::load(&path).expect("should load").len(), 3);

    let leftovers = fs::read_dir(dir.path()).expect("should list").count();
    assert_eq!(leftovers, 1, "spool and staging files are cleaned up");
}

#[test]
fn unfinished_writer_leaves_destination_untouched() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("index.json");
    sample_index().save(&path).expect("should save");

    let mut writer = IndexWriter::create(&path, "other-model").expect("should create writer");
    writer
        .append(&[record("x", "new", "x.txt")], &[vec![1.0, 1.0]])
        .expect("append");
    drop(writer);

    assert_eq!(KnowledgeIndex::load(&path).expect("should load"), sample_index());
}

#[test]
fn writer_rejects_misaligned_or_inconsistent_batches() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("index.json");
    let mut writer = IndexWriter::create(&path, "m").expect("should create writer");

    assert!(writer
        .append(&[record("a", "t", "s")], &[vec![1.0], vec![2.0]])
        .is_err());
    writer
        .append(&[record("a", "t", "s")], &[vec![1.0, 2.0]])
        .expect("first batch fixes the dimension");
    assert!(writer
        .append(&[record("b", "t", "s")], &[vec![1.0, 2.0, 3.0]])
        .is_err());
    assert!(writer
        .append(&[record("c", "t", "s")], &[vec![f32::NAN, 1.0]])
        .is_err());
    assert_eq!(writer.len(), 1);
}

#[test]
fn load_reports_missing_file() {
    let dir = TempDir::new().expect("should create temp dir");
    let result = KnowledgeIndex::load(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(KbError::IndexFileInvalid(_))));
}

#[test]
fn load_rejects_structural_problems() {
    let dir = TempDir::new().expect("should create temp dir");
    let cases = [
        ("garbage", "not json"),
        ("missing_vectors", r#"{"model":"m","chunks":[]}"#),
        ("missing_model", r#"{"chunks":[],"vectors":[]}"#),
        (
            "length_mismatch",
            r#"{"model":"m","chunks":[{"id":"1","text":"t","source":"s"}],"vectors":[]}"#,
        ),
        (
            "ragged",
            r#"{"model":"m","chunks":[{"id":"1","text":"t","source":"s"},{"id":"2","text":"u","source":"s"}],"vectors":[[1.0,2.0],[1.0]]}"#,
        ),
        (
            "zero_dimension",
            r#"{"model":"m","chunks":[{"id":"1","text":"t","source":"s"}],"vectors":[[]]}"#,
        ),
        (
            "chunk_missing_source",
            r#"{"model":"m","chunks":[{"id":"1","text":"t"}],"vectors":[[1.0]]}"#,
        ),
    ];

    for (name, body) in cases {
        let path = dir.path().join(format!("{name}.json"));
        fs::write(&path, body).expect("should write");
        assert!(
            matches!(KnowledgeIndex::load(&path), Err(KbError::IndexFileInvalid(_))),
            "{name} should be rejected"
        );
    }
}

#[test]
fn chunk_counts_per_source() {
    let index = sample_index();
    assert_eq!(index.chunks_per_source(), vec![("a.txt", 2), ("b.md", 1)]);
    assert_eq!(index.dimension(), Some(2));
}
