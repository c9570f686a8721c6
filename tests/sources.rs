//! Tests for text, JSON Lines and directory sources.

use ironpipe::testing::*;
use ironpipe::*;
use std::fs;

fn texts(items: &[&str]) -> Vec<Element> {
    items.iter().map(|s| Element::from(*s)).collect()
}

#[test]
fn text_source_yields_lines_without_terminators() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.touch("crlf.txt", "first\r\nsecond\n\nlast")?;
    let out = Pipeline::new(TextSource::open(&path)?).collect()?;
    assert_elements_equal(&out, &texts(&["first", "second", "", "last"]));
    Ok(())
}

#[test]
fn text_source_can_be_read_many_times() -> anyhow::Result<()> {
    let file = mock_text_file(&["a", "b", "c"])?;
    let p = Pipeline::new(TextSource::open(file.path())?);
    assert_eq!(p.count()?, 3);
    assert_eq!(p.count()?, 3);
    Ok(())
}

#[test]
fn missing_files_fail_at_construction() {
    let dir = TempDirPath::new().expect("temp dir");
    let missing = dir.file_path("nope.txt");
    assert!(matches!(TextSource::open(&missing), Err(Error::SourceUnavailable { .. })));
    assert!(matches!(JsonlSource::open(&missing), Err(Error::SourceUnavailable { .. })));
    assert!(matches!(
        DirectorySource::open(dir.file_path("no_such_dir"), "*"),
        Err(Error::SourceUnavailable { .. })
    ));
}

#[test]
fn deleted_files_fail_at_the_next_pass() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.touch("gone.txt", "x\n")?;
    let p = Pipeline::new(TextSource::open(&path)?);
    assert_eq!(p.count()?, 1);
    fs::remove_file(&path)?;
    assert!(matches!(p.iter(), Err(Error::SourceUnavailable { .. })));
    Ok(())
}

#[test]
fn invalid_utf8_is_an_error_unless_lossy() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("latin1.txt");
    fs::write(&path, b"caf\xe9\nok\n")?;

    let strict = Pipeline::new(TextSource::open(&path)?).collect();
    assert!(matches!(strict, Err(Error::Io(_))));

    let lossy = Pipeline::new(TextSource::open(&path)?.lossy(true)).collect()?;
    assert_elements_equal(&lossy, &texts(&["caf\u{fffd}", "ok"]));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_text_is_decompressed_transparently() -> anyhow::Result<()> {
    let file = mock_gz_text_file(&["alpha beta", "gamma"])?;
    let words = Pipeline::new(TextSource::open(file.path())?).flat_map(split_words());
    assert_elements_equal(&words.collect()?, &texts(&["alpha", "beta", "gamma"]));

    // Magic-byte detection works without the extension.
    let dir = TempDirPath::new()?;
    let renamed = dir.file_path("no_extension");
    fs::copy(file.path(), &renamed)?;
    assert_eq!(Pipeline::new(TextSource::open(&renamed)?).count()?, 2);
    Ok(())
}

#[test]
fn directory_source_lists_sorted_matches() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    dir.touch("b.txt", "")?;
    dir.touch("a.txt", "")?;
    dir.touch("c.log", "")?;

    let txt = Pipeline::new(DirectorySource::open(dir.path(), "*.txt")?).collect()?;
    let names: Vec<String> = txt
        .iter()
        .filter_map(|e| e.as_str())
        .filter_map(|p| std::path::Path::new(p).file_name()?.to_str().map(String::from))
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    assert_eq!(Pipeline::new(DirectorySource::all(dir.path())?).count()?, 3);
    Ok(())
}

#[test]
fn directory_passes_see_new_files() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    dir.touch("one.txt", "")?;
    let p = Pipeline::new(DirectorySource::open(dir.path(), "*.txt")?);
    assert_eq!(p.count()?, 1);
    dir.touch("two.txt", "")?;
    assert_eq!(p.count()?, 2);
    Ok(())
}

#[test]
fn invalid_patterns_are_rejected() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    assert!(matches!(
        DirectorySource::open(dir.path(), "[unclosed"),
        Err(Error::SourceUnavailable { .. })
    ));
    Ok(())
}

#[test]
fn jsonl_source_reads_elements_and_skips_blank_lines() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.touch("data.jsonl", "{\"Int\":1}\n\n{\"Text\":\"x\"}\n\"Null\"\n")?;
    let out = Pipeline::new(JsonlSource::open(&path)?).collect()?;
    assert_elements_equal(&out, &[Element::Int(1), Element::from("x"), Element::Null]);
    Ok(())
}

#[test]
fn malformed_jsonl_lines_name_their_line() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.touch("bad.jsonl", "{\"Int\":1}\n{oops\n")?;
    let mut it = Pipeline::new(JsonlSource::open(&path)?).iter()?;
    assert_eq!(it.next().transpose()?, Some(Element::Int(1)));
    match it.next() {
        Some(Err(Error::Serialization(msg))) => assert!(msg.contains("line 2"), "{msg}"),
        other => panic!("expected a serialization error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn write_jsonl_round_trips_through_the_source() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("nested/out.jsonl");
    let data = vec![Element::list([1, 2]), Element::Float(0.5), Element::Bytes(vec![9])];
    assert_eq!(write_jsonl(&path, &data)?, 3);
    assert_elements_equal(&Pipeline::new(JsonlSource::open(&path)?).collect()?, &data);
    Ok(())
}

#[test]
fn source_specs_reopen_their_sources() -> anyhow::Result<()> {
    let file = mock_text_file(&["x", "y"])?;
    let text = TextSource::open(file.path())?;
    let spec = text.describe().expect("text sources describe themselves");
    let reopened = spec.open()?;
    assert_eq!(Pipeline::from_source(reopened).count()?, 2);

    let values = ValuesSource::new(ints(0..4));
    let spec = values.describe().expect("values describe themselves");
    assert_eq!(spec, SourceSpec::Values { values: ints(0..4) });
    assert_elements_equal(&Pipeline::from_source(spec.open()?).collect()?, &ints(0..4));
    Ok(())
}

#[test]
fn pass_streams_are_independent() -> anyhow::Result<()> {
    let file = mock_text_file(&["1", "2", "3"])?;
    let source = TextSource::open(file.path())?;
    let mut a = source.begin_pass()?;
    let mut b = source.begin_pass()?;
    assert_eq!(a.next().transpose()?, Some(Element::from("1")));
    assert_eq!(a.next().transpose()?, Some(Element::from("2")));
    assert_eq!(b.next().transpose()?, Some(Element::from("1")));
    Ok(())
}
