//! Tests for saving, loading and replaying pipeline definitions.

use anyhow::anyhow;
use ironpipe::testing::*;
use ironpipe::*;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

/// Vocabulary lookup: maps known words to ids and unknown words to 0.
fn vocab_lookup(vocab: Arc<HashMap<String, i64>>) -> MapFn {
    MapFn::new("vocab_lookup", move |e: Element| {
        let word = e.as_str().ok_or_else(|| anyhow!("expected a word"))?;
        Ok(Element::Int(vocab.get(word).copied().unwrap_or(0)))
    })
}

fn registry(vocab: Arc<HashMap<String, i64>>) -> FnRegistry {
    FnRegistry::new()
        .with_map(vocab_lookup(vocab))
        .with_map(double())
        .with_predicate(is_even())
        .with_flat_map(split_words())
        .with_flat_map(duplicate())
}

#[test]
fn replaying_a_vocabulary_chain_on_a_held_out_corpus() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let def_path = dir.path().join("chain.json");

    let vocab: Arc<HashMap<String, i64>> = Arc::new(
        [("the", 1), ("cat", 2), ("sat", 3)]
            .into_iter()
            .map(|(w, i)| (w.to_string(), i))
            .collect(),
    );

    let train = from_vec(vec!["the cat", "sat"])
        .flat_map(split_words())
        .map(vocab_lookup(Arc::clone(&vocab)))
        .batch(2)?;
    save_pipeline(&def_path, &train)?;

    let held_out = mock_text_file(&["the dog sat", "cat"])?;
    let chain = load_pipeline(&def_path, &registry(Arc::clone(&vocab)))?;
    let replayed = chain.attach(TextSource::open(held_out.path())?);

    let direct = Pipeline::new(TextSource::open(held_out.path())?)
        .flat_map(split_words())
        .map(vocab_lookup(vocab))
        .batch(2)?;

    assert_elements_equal(&replayed.collect()?, &direct.collect()?);
    assert_elements_equal(&replayed.collect()?, &[int_list([1, 0]), int_list([3, 2])]);
    Ok(())
}

#[test]
fn every_parameterized_step_round_trips() -> anyhow::Result<()> {
    let p = from_range(0..50)
        .map(double())
        .filter(is_even())
        .shuffle_seeded(4, 77)?
        .flat_map(duplicate())
        .take(30)
        .prefetch(3)
        .repeat_n(2)
        .map_parallel(double(), ParallelOptions::ordered().with_workers(2).with_chunk_size(3))?
        .filter_parallel(is_even(), ParallelOptions::default().with_workers(3))?
        .flat_map_parallel(duplicate(), ParallelOptions::ordered())?
        .window(2)?
        .batch(5)?;

    let def = PipelineDefinition::from_pipeline(&p)?;
    let again = PipelineDefinition::from_json(&def.to_json()?)?;
    assert_eq!(again, def);

    let chain = again.resolve(&registry(Arc::new(HashMap::new())))?;
    let kinds: Vec<&str> = chain.steps().iter().map(Step::kind).collect();
    let original: Vec<&str> = p.steps().iter().map(Step::kind).collect();
    assert_eq!(kinds, original);

    // Same seed, same parameters: the replay is element-for-element identical.
    let replayed = chain.run_on(ints(0..50))?;
    assert_elements_equal(&replayed, &p.collect()?);
    Ok(())
}

#[test]
fn zip_and_concat_partners_are_saved_with_their_sources() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let partner_file = mock_jsonl_file(&ints(100..103))?;
    let partner = Pipeline::new(JsonlSource::open(partner_file.path())?).map(double());

    let p = from_range(0..5)
        .zip(&partner)
        .concat(&from_vec(vec![Element::list([7, 7])]));

    let path = dir.path().join("zip.json");
    save_pipeline(&path, &p)?;
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(json["version"], 1);
    assert_eq!(json["steps"][0]["kind"], "zip");
    assert_eq!(json["steps"][0]["others"][0]["source"]["kind"], "jsonl");
    assert_eq!(json["steps"][1]["others"][0]["source"]["kind"], "values");

    let chain = load_pipeline(&path, &registry(Arc::new(HashMap::new())))?;
    let out = chain.run_on(ints(0..5))?;
    assert_elements_equal(
        &out,
        &[int_list([0, 200]), int_list([1, 202]), int_list([2, 204]), int_list([7, 7])],
    );
    Ok(())
}

/// A source that cannot describe itself.
struct Opaque;

impl Source for Opaque {
    fn name(&self) -> String {
        "opaque".to_string()
    }

    fn begin_pass(&self) -> Result<ElementStream> {
        Ok(Box::new(std::iter::empty::<Result<Element>>()))
    }
}

#[test]
fn indescribable_partners_cannot_be_saved() {
    let p = from_range(0..3).zip(&Pipeline::new(Opaque));
    assert!(matches!(PipelineDefinition::from_pipeline(&p), Err(Error::Serialization(_))));

    // The primary source is never written, so it may be opaque.
    assert!(PipelineDefinition::from_pipeline(&Pipeline::new(Opaque).map(double())).is_ok());
}

#[test]
fn unknown_functions_fail_to_load() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("chain.json");
    save_pipeline(&path, &from_range(0..3).map(square()))?;

    match load_pipeline(&path, &FnRegistry::new().with_map(double())) {
        Err(Error::Serialization(msg)) => assert!(msg.contains("square"), "{msg}"),
        other => panic!("expected a serialization error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_definitions_are_serialization_errors() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{"version":1,"steps":[{"kind":"teleport"}]}"#)?;
    assert!(matches!(load_pipeline(&path, &FnRegistry::new()), Err(Error::Serialization(_))));

    fs::write(&path, "not json")?;
    assert!(matches!(load_pipeline(&path, &FnRegistry::new()), Err(Error::Serialization(_))));
    Ok(())
}

#[test]
fn pipeline_registry_relinks_its_own_definition() -> anyhow::Result<()> {
    let p = from_range(0..6).map(double()).filter(is_even()).flat_map(duplicate());
    let chain = PipelineDefinition::from_pipeline(&p)?.resolve(&p.registry())?;
    assert_elements_equal(&chain.run_on(ints(0..6))?, &p.collect()?);
    Ok(())
}
