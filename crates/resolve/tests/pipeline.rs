use phylo_resolve::{
    AnalysisConfig, CalibrationTarget, ErrorKind, ModelData, NoteLevel, Pipeline, TreePrior,
};
use phylo_taxonomy::TaxonomyIndex;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

const TAXONOMY: &str = "\
((('English [stan1293][eng]-l-','Scots [scot1243][sco]-l-')'Anglic [angl1265]','German [stan1295][deu]-l-',('Icelandic [icel1247][isl]-l-','Norwegian [norw1258][nor]-l-')'North Germanic [nort3160]')'Germanic [germ1287]',('French [stan1290][fra]-l-','Italian [ital1282][ita]-l-','Spanish [stan1288][spa]-l-')'Romance [roma1334]')'Indo-European [indo1319]';
('Basque [basq1248][eus]-l-')'Basque family [basq1247]';
";

fn taxonomy() -> TaxonomyIndex {
    TaxonomyIndex::from_newick(TAXONOMY).unwrap()
}

fn table(rows: &[(&str, &[&str])]) -> BTreeMap<String, BTreeMap<String, String>> {
    rows.iter()
        .map(|(lang, values)| {
            let features = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("f{i}"), v.to_string()))
                .collect();
            (lang.to_string(), features)
        })
        .collect()
}

fn data() -> ModelData {
    let lexicon = table(&[
        ("eng", &["1", "2", "1"]),
        ("sco", &["1", "2", "2"]),
        ("deu", &["1", "3", "1"]),
        ("isl", &["2", "3", "1"]),
        ("nor", &["2", "3", "?"]),
        ("fra", &["4", "1", "1"]),
        ("ita", &["4", "1", "2"]),
        ("spa", &["4", "1", "-"]),
    ]);
    let grammar = table(&[
        ("eng", &["a", "b"]),
        ("deu", &["a", "a"]),
        ("fra", &["b", "b"]),
        ("ita", &["b", "?"]),
        ("eus", &["c", "c"]),
    ]);
    BTreeMap::from([
        ("lexicon".to_string(), lexicon),
        ("grammar".to_string(), grammar),
    ])
}

fn config(text: &str) -> AnalysisConfig {
    AnalysisConfig::from_bytes(text.as_bytes()).unwrap()
}

const FULL: &str = r#"
[languages]
monophyly = true

[language_groups]
west = "Anglic, deu"

[calibration]
Germanic = "1500-2500"
"originate(Romance)" = "normal(2000, 100)"
eng = "0-50"

[model.lexicon]
kind = "covarion"

[model.grammar]
clock = "slow"
pruned = true

[clock.slow]
kind = "relaxed"

[clock.spare]
kind = "strict"
"#;

#[test]
fn full_analysis_resolves_every_stage() {
    let taxonomy = taxonomy();
    let analysis = Pipeline::new(config(FULL), &taxonomy).run(&data()).unwrap();

    assert_eq!(
        analysis.languages,
        vec!["deu", "eng", "eus", "fra", "isl", "ita", "nor", "sco", "spa"]
    );
    assert_eq!(
        analysis.monophyly.as_ref().unwrap().newick,
        "((((eng,sco),(isl,nor),deu),(fra,ita,spa)),eus)"
    );
    assert_eq!(analysis.language_groups["west"], vec!["deu", "eng", "sco"]);

    let calibrations = &analysis.calibrations;
    assert_eq!(
        calibrations.clades.keys().cloned().collect::<Vec<_>>(),
        vec!["Germanic", "Romance_originate"]
    );
    assert_eq!(
        calibrations.clades["Romance_originate"].target,
        CalibrationTarget::Originate
    );
    assert_eq!(calibrations.tips["eng"].languages, vec!["eng"]);

    // The tip calibration upgrades the tree prior.
    assert_eq!(analysis.tree_prior, TreePrior::Coalescent);

    let clocks: Vec<(&str, bool)> = analysis
        .linkage
        .clocks
        .iter()
        .map(|c| (c.name.as_str(), c.estimate_rate))
        .collect();
    assert_eq!(clocks, vec![("slow", true), ("default", true)]);
    assert_eq!(analysis.linkage.model("lexicon").unwrap().clock, "default");
    assert!(analysis.linkage.model("grammar").unwrap().pruned);

    let messages: Vec<String> = analysis.notes.iter().map(|n| n.message.clone()).collect();
    assert!(
        messages.iter().any(|m| m.contains("Switching the tree prior")),
        "{messages:?}"
    );
    assert!(messages.iter().any(|m| m.contains("spare")), "{messages:?}");
    assert!(analysis.notes.iter().all(|n| n.level == NoteLevel::Info));
}

#[test]
fn resolved_analysis_serializes_for_rendering() {
    let taxonomy = taxonomy();
    let analysis = Pipeline::new(config(FULL), &taxonomy).run(&data()).unwrap();
    let json: Value = serde_json::from_str(&analysis.to_json().unwrap()).unwrap();

    assert_eq!(json["tree_prior"], "coalescent");
    assert_eq!(json["languages"].as_array().unwrap().len(), 9);
    assert_eq!(json["monophyly"]["tree"][1], "eus");
    assert_eq!(json["calibrations"]["clades"]["Germanic"]["distribution"]["kind"], "uniform");
    assert_eq!(json["calibrations"]["tips"]["eng"]["target"], "tip");
    assert_eq!(json["clocks"][0]["kind"], "relaxed");
    assert_eq!(json["models"][1]["name"], "lexicon");
    assert_eq!(json["models"][1]["kind"], "covarion");
    assert_eq!(json["notes"][0]["level"], "info");
}

#[test]
fn intersection_keeps_shared_languages_only() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[languages]
overlap = "intersection"

[model.lexicon]
[model.grammar]
"#,
    );
    let analysis = Pipeline::new(config, &taxonomy).run(&data()).unwrap();
    assert_eq!(analysis.languages, vec!["deu", "eng", "fra", "ita"]);
    assert_eq!(analysis.monophyly, None);
}

#[test]
fn filters_and_exclusions_narrow_the_language_set() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[languages]
families = "Germanic, Basque family"
exclusions = ["nor"]

[model.lexicon]
[model.grammar]
"#,
    );
    let analysis = Pipeline::new(config, &taxonomy).run(&data()).unwrap();
    assert_eq!(analysis.languages, vec!["deu", "eng", "eus", "isl", "sco"]);
}

#[test]
fn free_clocks_without_time_scale_pin_one_rate() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[model.lexicon]
[model.grammar]
"#,
    );
    let analysis = Pipeline::new(config, &taxonomy).run(&data()).unwrap();

    let lexicon = analysis.linkage.clock("lexicon");
    assert_eq!(lexicon, None);
    let default = analysis.linkage.clock("default").unwrap();
    assert_eq!(default.models, vec!["grammar", "lexicon"]);
    assert!(!default.estimate_rate);
    assert_eq!(default.rate, 1.0);
    assert_eq!(analysis.tree_prior, TreePrior::Yule);
}

#[test]
fn pinned_clock_is_the_first_free_clock_by_name() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[model.lexicon]
clock = "zeta"

[model.grammar]
clock = "alpha"

[clock.zeta]
[clock.alpha]
"#,
    );
    let analysis = Pipeline::new(config, &taxonomy).run(&data()).unwrap();

    let clocks: Vec<(&str, bool)> = analysis
        .linkage
        .clocks
        .iter()
        .map(|c| (c.name.as_str(), c.estimate_rate))
        .collect();
    assert_eq!(clocks, vec![("alpha", false), ("zeta", true)]);
}

#[test]
fn monophyly_disables_itself_for_a_single_language() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[languages]
languages = ["eng"]
monophyly = true

[model.lexicon]
"#,
    );
    let analysis = Pipeline::new(config, &taxonomy).run(&data()).unwrap();
    assert_eq!(analysis.languages, vec!["eng"]);
    assert_eq!(analysis.monophyly, None);
    assert!(analysis
        .notes
        .iter()
        .any(|n| n.message.contains("only 1 language")));
}

#[test]
fn straddling_calibration_is_a_consistency_error() {
    let taxonomy = taxonomy();
    let config = config(
        r#"
[languages]
monophyly = true

[calibration]
"sco, deu" = "100-200"

[model.lexicon]
"#,
    );
    let err = Pipeline::new(config, &taxonomy).run(&data()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency, "{err}");
}

#[test]
fn configuration_errors_abort_the_run() {
    let taxonomy = taxonomy();
    let cases = [
        // originate of the whole analysis
        "[calibration]\n\"originate(root)\" = \"5000-7000\"\n[model.lexicon]\n",
        // unknown clock reference
        "[model.lexicon]\nclock = \"nope\"\n",
        // empty group
        "[language_groups]\nghost = \"Uralic\"\n[model.lexicon]\n",
        // nothing left after filtering
        "[languages]\nexclusions = \"eng,sco,deu,isl,nor,fra,ita,spa\"\n[model.lexicon]\n",
        // model without data
        "[model.phonology]\n",
        // malformed distribution
        "[calibration]\nRomance = \"10 to 20\"\n[model.lexicon]\n",
    ];
    for text in cases {
        let err = Pipeline::new(config(text), &taxonomy)
            .run(&data())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config, "{text}: {err}");
    }
}

#[test]
fn files_on_disk_resolve_like_inline_text() {
    let dir = tempdir().unwrap();
    let tree_path = dir.path().join("taxonomy.nwk");
    let config_path = dir.path().join("analysis.json");
    fs::write(&tree_path, TAXONOMY).unwrap();
    fs::write(
        &config_path,
        r#"{
  "languages": {"monophyly": true, "subsample_size": 4},
  "model": {"lexicon": {}}
}"#,
    )
    .unwrap();

    let taxonomy = TaxonomyIndex::from_newick(&fs::read_to_string(&tree_path).unwrap()).unwrap();
    let config = AnalysisConfig::from_path(&config_path).unwrap();
    let first = Pipeline::new(config.clone(), &taxonomy).run(&data()).unwrap();
    let second = Pipeline::new(config, &taxonomy).run(&data()).unwrap();

    assert_eq!(first.languages.len(), 4);
    assert_eq!(first, second);
    assert!(first
        .notes
        .iter()
        .any(|n| n.message.starts_with("Subsampled 4 of 8")));
}
