use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use akg_builder::app::App;
use akg_builder::config::{Config, ConfigLoader};
use akg_builder::domain::Stage;
use akg_builder::error::AkgError;
use akg_builder::ledger::Ledger;
use akg_builder::output::JsonOutput;
use akg_builder::store::{DEFAULT_LEDGER_FILE, Store};
use akg_builder::suitability::{SuitabilityChecker, Verdict};
use akg_builder::table::Table;
use akg_builder::workbook::{Sheet, WorkbookReader};

const SOURCE: &str = "12345678";

const REFERENCE: &str = "hgnc_id\tensembl_gene_id\tsymbol\n\
HGNC:11998\tENSG00000141510\tTP53\n\
HGNC:1100\tENSG00000012048\tBRCA1\n";

/// Serves one fixed sheet for any workbook path.
#[derive(Clone)]
struct FixedWorkbook;

impl WorkbookReader for FixedWorkbook {
    fn read_sheets(&self, _path: &Utf8Path) -> Result<Vec<Sheet>, AkgError> {
        Ok(vec![Sheet {
            name: "DEG up".to_string(),
            table: Table::new(
                vec!["gene".into(), "padj".into(), "log2FoldChange".into()],
                vec![vec!["BRCA1".into(), "0.03".into(), "-2.5".into()]],
            ),
        }])
    }
}

struct RejectAll;

impl SuitabilityChecker for RejectAll {
    fn check(&self, _path: &Utf8Path, _header_skip: u32) -> Verdict {
        Verdict {
            suitable: false,
            reason: "no expression data".to_string(),
            fold_change_column: None,
        }
    }
}

fn workspace() -> (tempfile::TempDir, Utf8PathBuf, App<FixedWorkbook>) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let source_dir = dir.join("supp_data").join(SOURCE);
    fs::create_dir_all(source_dir.as_std_path()).unwrap();
    fs::write(
        source_dir.join("table.csv").as_std_path(),
        "gene,pval,log2fc\nTP53,0.01,1.5\nUNKNOWNXYZ,0.2,-0.3\n",
    )
    .unwrap();
    fs::write(source_dir.join("book.xlsx").as_std_path(), b"PK").unwrap();
    fs::write(dir.join("gene_ids.txt").as_std_path(), REFERENCE).unwrap();

    let config = ConfigLoader::resolve_config(Config::default()).unwrap();
    let store = Store::new_with_paths(dir.clone(), DEFAULT_LEDGER_FILE, &config);
    (temp, dir, App::new(store, config, FixedWorkbook))
}

fn ledger(dir: &Utf8Path) -> Ledger {
    Ledger::load(&dir.join(DEFAULT_LEDGER_FILE)).unwrap()
}

#[test]
fn full_pipeline_produces_graphs() {
    let (_temp, dir, app) = workspace();

    let scan = app.scan(&JsonOutput).unwrap();
    assert_eq!(scan.added, 2);
    assert_eq!(app.scan(&JsonOutput).unwrap().added, 0);

    let split = app.split(&JsonOutput).unwrap();
    assert_eq!((split.processed, split.produced), (2, 2));
    assert!(dir.join("supp_data/12345678/split_DEGup.csv").as_std_path().is_file());

    assert_eq!(app.convert(&JsonOutput).unwrap().produced, 2);
    assert_eq!(app.clean(&JsonOutput).unwrap().produced, 2);
    let extract = app.extract(&JsonOutput).unwrap();
    assert_eq!(extract.stage.produced, 2);
    assert_eq!(extract.totals.matched, 2);
    assert_eq!(extract.totals.unmatched, 1);

    let ledger = ledger(&dir);
    assert_eq!(ledger.len(), 10);
    let graph_entry = ledger
        .entries()
        .iter()
        .find(|entry| entry.filename == "graph_table.nt")
        .unwrap();
    assert_eq!(graph_entry.stage, Stage::TripleExtracted);
    assert_eq!(graph_entry.gene_column, "gene");
    assert_eq!(graph_entry.pvalue_column, "pval");
    assert_eq!(graph_entry.lfc_column, "log2fc");
    assert_eq!((graph_entry.matched_count, graph_entry.unmatched_count), (1, 1));
    let lineage = ledger.derivation().ancestors(&graph_entry.entry_id);
    assert_eq!(lineage.len(), 4);
    assert_eq!(lineage.last().unwrap().filename, "table.csv");

    let graph =
        fs::read_to_string(dir.join("supp_data/12345678/graph_table.nt").as_std_path()).unwrap();
    assert!(graph.contains("<https://monarchinitiative.org/HGNC:11998>"));
    assert!(graph.contains("<https://w3id.org/biolink/vocab/symbol> \"UNKNOWNXYZ\""));
    assert!(graph.contains(
        "<https://pubmed.ncbi.nlm.nih.gov/12345678> <http://edamontology.org/has_output>"
    ));
    assert!(
        dir.join("supp_data/12345678/graph_table.nt.row_uri_labels.json")
            .as_std_path()
            .is_file()
    );

    let uuids = fs::read_to_string(dir.join("filename_uuid_map.json").as_std_path()).unwrap();
    assert!(uuids.contains("cleaned_table"));
    assert!(uuids.contains("cleaned_DEGup"));
}

fn run_all(app: &App<FixedWorkbook>) -> usize {
    [
        app.split(&JsonOutput).unwrap().produced,
        app.convert(&JsonOutput).unwrap().produced,
        app.clean(&JsonOutput).unwrap().produced,
        app.extract(&JsonOutput).unwrap().stage.produced,
    ]
    .iter()
    .sum()
}

fn snapshot(dir: &Utf8Path) -> Vec<(Utf8PathBuf, Vec<u8>)> {
    Store::list_files(dir)
        .unwrap()
        .into_iter()
        .filter(|path| path.extension() != Some("log"))
        .map(|path| {
            let content = fs::read(path.as_std_path()).unwrap();
            (path, content)
        })
        .collect()
}

#[test]
fn stages_run_once_per_input() {
    let (_temp, dir, app) = workspace();
    app.scan(&JsonOutput).unwrap();
    assert_eq!(run_all(&app), 8);
    let before = ledger(&dir);
    let files = snapshot(&dir);

    assert_eq!(app.scan(&JsonOutput).unwrap().added, 0);
    assert_eq!(run_all(&app), 0);
    let again = app.extract(&JsonOutput).unwrap();
    assert_eq!((again.stage.pending, again.totals.rows), (0, 0));

    assert_eq!(before.entries(), ledger(&dir).entries());
    assert_eq!(files, snapshot(&dir));
}

#[test]
fn exclusion_stops_downstream_stages() {
    let (_temp, dir, app) = workspace();
    app.scan(&JsonOutput).unwrap();
    app.split(&JsonOutput).unwrap();

    let excluded = app.exclude("split_table.csv", "wrong table").unwrap();
    assert_eq!(excluded.reason, "wrong table");
    let convert = app.convert(&JsonOutput).unwrap();
    assert_eq!(convert.pending, 1);

    let ledger = ledger(&dir);
    let entry = ledger.find(&excluded.entry_id).unwrap();
    assert!(entry.excluded);
    assert!(entry.manual_override);
    assert_eq!(entry.manual_reason, "wrong table");
    assert_eq!(entry.stage, Stage::Split);
    assert!(ledger.derivation().children(&entry.entry_id).is_empty());

    assert_matches!(
        app.exclude("nothing.csv", "x"),
        Err(AkgError::EntryNotFound(_))
    );
}

#[test]
fn check_records_verdicts_once() {
    let (_temp, dir, app) = workspace();
    app.scan(&JsonOutput).unwrap();
    app.split(&JsonOutput).unwrap();

    let report = app.check_with(&RejectAll, true, &JsonOutput).unwrap();
    assert_eq!(report.checked.len(), 2);
    assert!(report.checked.iter().all(|file| file.excluded));
    assert_eq!(app.convert(&JsonOutput).unwrap().pending, 0);
    assert!(app.check_with(&RejectAll, true, &JsonOutput).unwrap().checked.is_empty());

    let ledger = ledger(&dir);
    let split = ledger
        .entries()
        .iter()
        .find(|entry| entry.filename == "split_table.csv")
        .unwrap();
    assert!(!split.suitable);
    assert!(!split.manual_override);
    assert_eq!(split.manual_reason, "unsuitable: no expression data");
}

#[test]
fn stages_need_a_ledger() {
    let (_temp, _dir, app) = workspace();
    assert_matches!(app.split(&JsonOutput), Err(AkgError::LedgerMissing(_)));
    assert_matches!(app.report(), Err(AkgError::LedgerMissing(_)));
}

#[test]
fn locked_ledger_is_a_write_conflict() {
    let (_temp, dir, app) = workspace();
    fs::write(dir.join(format!(".~lock.{DEFAULT_LEDGER_FILE}#")).as_std_path(), "").unwrap();
    assert_matches!(app.scan(&JsonOutput), Err(AkgError::LedgerWriteConflict(_)));
}

#[test]
fn report_combine_and_tidy() {
    let (_temp, dir, app) = workspace();
    app.scan(&JsonOutput).unwrap();
    app.split(&JsonOutput).unwrap();
    app.convert(&JsonOutput).unwrap();
    app.clean(&JsonOutput).unwrap();
    app.extract(&JsonOutput).unwrap();

    let report = app.report().unwrap();
    assert_eq!(report.entries, 10);
    let text = fs::read_to_string(&report.path).unwrap();
    assert!(text.contains("genes matched: 2, unmatched: 1"));
    assert!(text.contains("source 12345678"));

    let combined = app.combine(Some(SOURCE), &[], None).unwrap();
    assert_eq!(combined.inputs.len(), 2);
    assert!(combined.output.ends_with("graph/combined_12345678.nt"));
    let merged = fs::read_to_string(&combined.output).unwrap();
    assert_eq!(merged.lines().count(), combined.triples);
    assert!(merged.contains("HGNC:11998"));
    assert!(merged.contains("HGNC:1100"));

    fs::write(
        dir.join("graph/raw.nt").as_std_path(),
        "<urn:uuid:a> <http://purl.org/dc/terms/date> \"2021\" .\n<urn:uuid:a> <http://edamontology.org/data_1669> \"\" .\n",
    )
    .unwrap();
    let tidy = app.tidy("raw.nt", "tidy.nt").unwrap();
    assert_eq!((tidy.kept, tidy.dropped), (1, 1));
    let tidied = fs::read_to_string(dir.join("graph/tidy.nt").as_std_path()).unwrap();
    assert!(tidied.contains("^^<http://www.w3.org/2001/XMLSchema#gYear>"));
}

#[test]
fn combine_without_graphs_is_an_error() {
    let (_temp, _dir, app) = workspace();
    assert_matches!(
        app.combine(None, &[], None),
        Err(AkgError::Configuration(_))
    );
}
