// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! End-to-end dictionary scenarios: create, mutate, flush, reopen, compact.

use std::collections::BTreeSet;
use std::path::PathBuf;

use talpa::{
    AttributeMap, Dictionary, FixedClock, FormatVersion, NgramContext, UnigramProperty,
};

fn new_dict(version: FormatVersion) -> Dictionary {
    Dictionary::create_on_memory(
        version,
        "en",
        &AttributeMap::new(),
        Box::new(FixedClock::new(1_700_000_000)),
    )
    .unwrap()
}

fn new_decaying_dict(now: u32) -> Dictionary {
    let mut attributes = AttributeMap::new();
    attributes.set_bool(talpa::header::USES_FORGETTING_CURVE_KEY, true);
    attributes.set_bool(talpa::header::HAS_HISTORICAL_INFO_KEY, true);
    Dictionary::create_on_memory(
        FormatVersion::V403,
        "en",
        &attributes,
        Box::new(FixedClock::new(now)),
    )
    .unwrap()
}

fn dict_dir(root: &tempfile::TempDir) -> PathBuf {
    root.path().join("test_dict")
}

fn all_words(dict: &Dictionary) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    let mut token = 0;
    loop {
        match dict.get_next_word_and_token(token) {
            Some((code_points, next)) => {
                words.insert(code_points.iter().filter_map(|&c| char::from_u32(c)).collect());
                if next == 0 {
                    break;
                }
                token = next;
            }
            None => break,
        }
    }
    words
}

#[test]
fn create_add_lookup() {
    let mut dict = new_dict(FormatVersion::V403);
    assert!(dict.add_unigram("hello", &UnigramProperty::with_probability(90)));
    assert_eq!(dict.get_probability("hello"), Some(90));
    assert_eq!(dict.get_probability("hell"), None);
    assert!(dict.get_word_id("hello").is_some());
    assert_eq!(dict.get_word_id("world"), None);
}

#[test]
fn adding_twice_keeps_one_word() {
    let mut dict = new_dict(FormatVersion::V403);
    assert!(dict.add_unigram("cat", &UnigramProperty::with_probability(100)));
    assert!(dict.add_unigram("cat", &UnigramProperty::with_probability(110)));
    assert_eq!(dict.get_probability("cat"), Some(110));
    assert_eq!(all_words(&dict).len(), 1);
    assert_eq!(dict.get_property(talpa::UNIGRAM_COUNT_QUERY), "1");
}

#[test]
fn removing_twice_fails_the_second_time() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(100));
    assert!(dict.remove_unigram("cat"));
    assert_eq!(dict.get_probability("cat"), None);
    assert!(!dict.remove_unigram("cat"));
    assert_eq!(dict.get_property(talpa::UNIGRAM_COUNT_QUERY), "0");
}

#[test]
fn example_scenario_bigram_blend_and_iteration() {
    let mut dict = new_dict(FormatVersion::V403);
    assert!(dict.add_unigram("cat", &UnigramProperty::with_probability(120)));
    assert!(dict.add_unigram("car", &UnigramProperty::with_probability(100)));

    let context = NgramContext::of_word(&"cat".chars().map(|c| c as u32).collect::<Vec<_>>());
    // "nap" does not exist yet; the add creates it as a placeholder unigram.
    assert!(dict.add_ngram(&context, "nap", 80));

    assert!(dict.get_word_id("cat").is_some());
    assert!(dict.get_word_id("nap").is_some());

    // The stored delta is probability/8; the blend maps it onto the gap
    // between the unigram probability and the top of the scale.
    let expected = 120 + (80 / 8 + 1) * (127 - 120) / 16;
    assert_eq!(dict.get_ngram_probability(&context, "nap"), Some(expected as u8));

    let words = all_words(&dict);
    let expected_words: BTreeSet<String> =
        ["cat", "car", "nap"].iter().map(|s| s.to_string()).collect();
    assert_eq!(words, expected_words);
}

#[test]
fn splitting_a_node_with_children_keeps_reconstruction_intact() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cats", &UnigramProperty::with_probability(50));
    dict.add_unigram("catsup", &UnigramProperty::with_probability(40));
    // Splits the "cats" node into "cat" + ["s", "alog"]; "catsup"'s tail node
    // hangs off the relocated "s" node.
    dict.add_unigram("catalog", &UnigramProperty::with_probability(30));

    let words = all_words(&dict);
    let expected: BTreeSet<String> = ["cats", "catsup", "catalog"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(words, expected);
    assert_eq!(dict.get_probability("cats"), Some(50));
    assert_eq!(dict.get_probability("catsup"), Some(40));
    assert_eq!(dict.get_probability("catalog"), Some(30));
}

#[test]
fn ngram_lookup_falls_back_to_unigram() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(100));
    dict.add_unigram("nap", &UnigramProperty::with_probability(70));
    let context = NgramContext::of_word(&"cat".chars().map(|c| c as u32).collect::<Vec<_>>());
    assert_eq!(dict.get_ngram_probability(&context, "nap"), Some(70));
}

#[test]
fn remove_ngram_only_removes_the_ngram() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(100));
    dict.add_unigram("nap", &UnigramProperty::with_probability(70));
    let context = NgramContext::of_word(&"cat".chars().map(|c| c as u32).collect::<Vec<_>>());
    assert!(dict.add_ngram(&context, "nap", 80));
    assert_eq!(dict.get_property(talpa::BIGRAM_COUNT_QUERY), "1");

    assert!(dict.remove_ngram(&context, "nap"));
    assert!(!dict.remove_ngram(&context, "nap"));
    assert_eq!(dict.get_property(talpa::BIGRAM_COUNT_QUERY), "0");
    assert_eq!(dict.get_probability("nap"), Some(70));
}

#[test]
fn beginning_of_sentence_context() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("hello", &UnigramProperty::with_probability(90));
    let bos = NgramContext::beginning_of_sentence();
    assert!(dict.add_ngram(&bos, "hello", 64));
    let blended = dict.get_ngram_probability(&bos, "hello").unwrap();
    assert!(blended >= 90);
}

#[test]
fn flush_and_reopen_reproduces_words() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(120));
    dict.add_unigram("car", &UnigramProperty::with_probability(100));
    dict.add_unigram("catalog", &UnigramProperty::with_probability(60));
    dict.remove_unigram("car");
    dict.flush(&dir).unwrap();

    let reopened = Dictionary::open(&dir, false, Box::new(FixedClock::new(1_700_000_000))).unwrap();
    assert_eq!(reopened.get_probability("cat"), Some(120));
    assert_eq!(reopened.get_probability("catalog"), Some(60));
    assert_eq!(reopened.get_probability("car"), None);
    let words = all_words(&reopened);
    assert!(words.contains("cat") && words.contains("catalog"));
    assert!(!words.contains("car"));
}

#[test]
fn flush_with_gc_roundtrip_preserves_everything_live() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    let words: &[(&str, u8)] = &[
        ("a", 40),
        ("an", 50),
        ("and", 110),
        ("ant", 30),
        ("be", 90),
        ("bee", 45),
        ("been", 70),
        ("cat", 120),
        ("catalog", 25),
        ("dog", 85),
    ];
    for (word, probability) in words {
        assert!(dict.add_unigram(word, &UnigramProperty::with_probability(*probability)));
    }
    let cat_ctx = NgramContext::of_word(&"cat".chars().map(|c| c as u32).collect::<Vec<_>>());
    assert!(dict.add_ngram(&cat_ctx, "dog", 48));
    dict.remove_unigram("ant");
    dict.remove_unigram("be"); // has children ("bee", "been")

    let ngram_before = dict.get_ngram_probability(&cat_ctx, "dog");
    dict.flush_with_gc(&dir).unwrap();

    let reopened = Dictionary::open(&dir, true, Box::new(FixedClock::new(1_700_000_000))).unwrap();
    for (word, probability) in words {
        match *word {
            "ant" | "be" => assert_eq!(reopened.get_probability(word), None, "{}", word),
            _ => assert_eq!(
                reopened.get_probability(word),
                Some(*probability),
                "{}",
                word
            ),
        }
    }
    assert_eq!(reopened.get_ngram_probability(&cat_ctx, "dog"), ngram_before);

    let words_after = all_words(&reopened);
    assert!(!words_after.contains("ant"));
    assert!(!words_after.contains("be"));
    assert!(words_after.contains("bee") && words_after.contains("been"));
}

#[test]
fn gc_then_further_updates_work() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(120));
    dict.add_unigram("car", &UnigramProperty::with_probability(100));
    dict.remove_unigram("car");
    dict.flush_with_gc(&dir).unwrap();

    let mut reopened =
        Dictionary::open(&dir, true, Box::new(FixedClock::new(1_700_000_000))).unwrap();
    assert!(reopened.add_unigram("cab", &UnigramProperty::with_probability(55)));
    assert_eq!(reopened.get_probability("cab"), Some(55));
    assert_eq!(reopened.get_probability("cat"), Some(120));
    reopened.flush(&dir).unwrap();

    let third = Dictionary::open(&dir, false, Box::new(FixedClock::new(1_700_000_000))).unwrap();
    assert_eq!(third.get_probability("cab"), Some(55));
}

#[test]
fn read_only_dictionaries_refuse_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(120));
    dict.flush(&dir).unwrap();

    let mut readonly =
        Dictionary::open(&dir, false, Box::new(FixedClock::new(1_700_000_000))).unwrap();
    assert!(!readonly.add_unigram("dog", &UnigramProperty::with_probability(1)));
    assert!(!readonly.remove_unigram("cat"));
    assert_eq!(readonly.get_probability("cat"), Some(120));
    assert!(!readonly.is_corrupted());
}

#[test]
fn truncated_body_fails_open() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(120));
    dict.flush(&dir).unwrap();

    let body_path = dir.join("test_dict.body");
    let bytes = std::fs::read(&body_path).unwrap();
    std::fs::write(&body_path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(Dictionary::open(&dir, true, Box::new(FixedClock::new(0))).is_err());
}

#[test]
fn decaying_dictionary_records_and_decays_history() {
    let start = 1_700_000_000;
    let mut dict = new_decaying_dict(start);

    // Ten observations climb the word to level 1.
    for _ in 0..10 {
        assert!(dict.add_unigram("hello", &UnigramProperty::with_probability(0)));
    }
    let property = dict.get_word_property("hello").unwrap();
    let info = property.historical_info.expect("decaying dict stores history");
    assert_eq!(info.level, 1);

    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);
    dict.flush_with_gc(&dir).unwrap();

    let reopened = Dictionary::open(&dir, true, Box::new(FixedClock::new(start))).unwrap();
    let property = reopened.get_word_property("hello").unwrap();
    assert_eq!(property.historical_info.unwrap().level, 1);
    assert!(reopened.get_probability("hello").unwrap() > 0);
}

#[test]
fn decaying_dictionary_forgets_unused_words() {
    let start = 1_700_000_000;
    let mut dict = new_decaying_dict(start);
    assert!(dict.add_unigram("ephemeral", &UnigramProperty::with_probability(0)));

    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);
    dict.flush_with_gc(&dir).unwrap();

    // Reopen far in the future: a level-0 word past its duration is dropped
    // by the next decay pass.
    let far_future = start + 400 * 24 * 60 * 60;
    let mut reopened =
        Dictionary::open(&dir, true, Box::new(FixedClock::new(far_future))).unwrap();
    reopened.flush_with_gc(&dir).unwrap();
    assert_eq!(reopened.get_probability("ephemeral"), None);
    assert!(all_words(&reopened).is_empty());
}

#[test]
fn shortcuts_survive_gc() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V403);
    let mut property = UnigramProperty::with_probability(80);
    property.shortcuts.push(talpa::ShortcutTarget {
        code_points: "on my way".chars().map(|c| c as u32).collect(),
        probability: talpa::WHITELIST_SHORTCUT_PROBABILITY,
    });
    assert!(dict.add_unigram("omw", &property));
    dict.add_unigram("filler", &UnigramProperty::with_probability(10));
    dict.remove_unigram("filler");
    dict.flush_with_gc(&dir).unwrap();

    let reopened = Dictionary::open(&dir, false, Box::new(FixedClock::new(0))).unwrap();
    let word = reopened.get_word_property("omw").unwrap();
    assert!(word.has_shortcuts);
    assert_eq!(word.shortcuts.len(), 1);
    assert_eq!(
        word.shortcuts[0].code_points,
        "on my way".chars().map(|c| c as u32).collect::<Vec<_>>()
    );
}

#[test]
fn word_property_reports_ngrams() {
    let mut dict = new_dict(FormatVersion::V403);
    dict.add_unigram("cat", &UnigramProperty::with_probability(120));
    dict.add_unigram("nap", &UnigramProperty::with_probability(70));
    let context = NgramContext::of_word(&"cat".chars().map(|c| c as u32).collect::<Vec<_>>());
    dict.add_ngram(&context, "nap", 80);

    let property = dict.get_word_property("cat").unwrap();
    assert!(property.has_ngrams);
    assert_eq!(property.ngrams.len(), 1);
    assert_eq!(
        property.ngrams[0].target_code_points,
        "nap".chars().map(|c| c as u32).collect::<Vec<_>>()
    );
}

#[test]
fn needs_gc_reports_false_on_fresh_dictionaries() {
    let dict = new_dict(FormatVersion::V403);
    assert!(!dict.needs_to_run_gc(true));
    assert!(!dict.needs_to_run_gc(false));
}

#[test]
fn v402_dictionaries_roundtrip_flat_probabilities() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = dict_dir(&tmp);

    let mut dict = new_dict(FormatVersion::V402);
    dict.add_unigram("plain", &UnigramProperty::with_probability(77));
    dict.flush_with_gc(&dir).unwrap();

    let reopened = Dictionary::open(&dir, false, Box::new(FixedClock::new(0))).unwrap();
    assert_eq!(reopened.header().version(), FormatVersion::V402);
    assert_eq!(reopened.get_probability("plain"), Some(77));
    let property = reopened.get_word_property("plain").unwrap();
    assert!(property.historical_info.is_none());
}
