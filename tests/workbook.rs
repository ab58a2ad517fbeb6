use sheet_tools::ToolError;
use sheet_tools::io::{excel_read, excel_write};
use sheet_tools::model::{CellValue, SheetTable, WorkbookData};
use sheet_tools::reconcile::ReconcileConfig;
use sheet_tools::sync::{self, ReconcileOutputs, SheetSource};
use sheet_tools::title::TitleOptions;
use tempfile::tempdir;

fn table(name: &str, columns: &[&str], rows: Vec<Vec<CellValue>>) -> SheetTable {
    let mut table = SheetTable::new(name, columns.iter().map(|c| c.to_string()).collect());
    for row in rows {
        table.push_row(row);
    }
    table
}

#[test]
fn workbook_roundtrip_preserves_values_and_sheet_order() {
    let workbook = WorkbookData {
        tables: vec![
            table(
                "values",
                &["text", "number", "flag", "blank"],
                vec![
                    vec!["hello".into(), CellValue::Number(2.5), CellValue::Bool(true), CellValue::Empty],
                    vec!["world".into(), CellValue::Number(-1.0), CellValue::Bool(false), "x".into()],
                ],
            ),
            table("empty", &["only_header"], vec![]),
        ],
    };

    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("values.xlsx");
    excel_write::write_workbook(&path, &workbook).expect("Excel written");
    let restored = excel_read::read_workbook(&path).expect("Excel read");

    assert_eq!(restored, workbook);
}

#[test]
fn missing_sheet_is_reported() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("book.xlsx");
    excel_write::write_table(&path, &table("present", &["a"], vec![vec!["1".into()]]))
        .expect("Excel written");

    let err = excel_read::read_sheet(&path, "absent").unwrap_err();
    assert!(matches!(err, ToolError::InvalidWorkbook(_)));
}

#[test]
fn reconcile_writes_changes_and_all_workbooks() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("tes.xlsx");
    let columns = ["adlshiftid", "memberid", "shift", "created"];
    let workbook = WorkbookData {
        tables: vec![
            table(
                "new",
                &columns,
                vec![
                    vec!["26.0".into(), "M1".into(), "day ".into(), "2024-02-01".into()],
                    vec!["40".into(), "M2".into(), "night".into(), "2024-02-02".into()],
                    vec!["41".into(), "M3".into(), "day".into(), "2024-02-03".into()],
                ],
            ),
            table(
                "old",
                &columns,
                vec![
                    vec!["26:00.0".into(), "m1".into(), "Day".into(), "2024-01-01".into()],
                    vec!["40".into(), "M2".into(), "day".into(), "2024-01-02".into()],
                    vec!["39".into(), "M9".into(), "day".into(), "2024-01-03".into()],
                ],
            ),
        ],
    };
    excel_write::write_workbook(&input, &workbook).expect("input written");

    let mut config = ReconcileConfig::new(["adlshiftid"], ["memberid", "shift"]);
    config.identifier_columns = vec!["adlshiftid".into()];
    let outputs = ReconcileOutputs {
        changes: temp_dir.path().join("comparison_result.xlsx"),
        all: temp_dir.path().join("comparison_result_all.xlsx"),
        rejected: None,
    };

    let report = sync::reconcile_workbooks(
        &SheetSource::new(&input, "old"),
        &SheetSource::new(&input, "new"),
        config,
        &outputs,
    )
    .expect("reconciled");

    let summary = &report.summary;
    assert_eq!(
        (summary.unchanged, summary.updated, summary.new, summary.old),
        (1, 1, 1, 1)
    );

    let all = excel_read::read_sheet(&outputs.all, "all").expect("all rows read");
    assert_eq!(all.columns, vec!["adlshiftid", "memberid", "shift", "created", "flag"]);
    let flags: Vec<(String, String)> = all
        .records()
        .map(|record| (record.get("adlshiftid").to_text(), record.get("flag").to_text()))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("26.0".to_string(), "unchanged".to_string()),
            ("39".to_string(), "old".to_string()),
            ("40".to_string(), "updated".to_string()),
            ("41".to_string(), "new".to_string()),
        ]
    );

    let changes = excel_read::read_sheet(&outputs.changes, "changes").expect("changes read");
    let changed_ids: Vec<String> = changes
        .records()
        .map(|record| record.get("adlshiftid").to_text())
        .collect();
    assert_eq!(changed_ids, vec!["40", "41"]);
}

#[test]
fn reconcile_fails_before_writing_on_missing_column() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("tes.xlsx");
    let workbook = WorkbookData {
        tables: vec![
            table("old", &["id", "v"], vec![vec!["1".into(), "a".into()]]),
            table("new", &["id", "v"], vec![vec!["1".into(), "b".into()]]),
        ],
    };
    excel_write::write_workbook(&input, &workbook).expect("input written");

    let outputs = ReconcileOutputs {
        changes: temp_dir.path().join("changes.xlsx"),
        all: temp_dir.path().join("all.xlsx"),
        rejected: Some(temp_dir.path().join("rejected.xlsx")),
    };
    let err = sync::reconcile_workbooks(
        &SheetSource::new(&input, "old"),
        &SheetSource::new(&input, "new"),
        ReconcileConfig::new(["id"], ["missing"]),
        &outputs,
    )
    .unwrap_err();

    assert!(matches!(err, ToolError::MissingColumn { .. }));
    assert!(!outputs.changes.exists());
    assert!(!outputs.all.exists());
    assert!(!outputs.rejected.as_ref().is_some_and(|path| path.exists()));
}

#[test]
fn reconcile_reports_missing_input() {
    let temp_dir = tempdir().expect("temporary directory");
    let missing = temp_dir.path().join("nope.xlsx");
    let outputs = ReconcileOutputs {
        changes: temp_dir.path().join("changes.xlsx"),
        all: temp_dir.path().join("all.xlsx"),
        rejected: None,
    };

    let err = sync::reconcile_workbooks(
        &SheetSource::new(&missing, "old"),
        &SheetSource::new(&missing, "new"),
        ReconcileConfig::new(["id"], ["v"]),
        &outputs,
    )
    .unwrap_err();
    assert!(matches!(err, ToolError::MissingInput(_)));
}

#[test]
fn compose_title_rewrites_sheet_and_keeps_others() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("monitoring.xlsx");
    let smart = table("SMART SHEET DATA", &["Title"], vec![vec!["Jane_Doe_2024-03-05".into()]]);
    let workbook = WorkbookData {
        tables: vec![
            smart.clone(),
            table(
                "PACELOGIC",
                &["firstname", "lastname", "mph_original_requested_date"],
                vec![
                    vec!["Jane".into(), "Doe".into(), "2024-03-05".into()],
                    vec!["John".into(), "Roe".into(), "unknown".into()],
                ],
            ),
        ],
    };
    excel_write::write_workbook(&path, &workbook).expect("input written");

    let stats = sync::compose_title(&path, "PACELOGIC", &TitleOptions::default())
        .expect("titles composed");
    assert_eq!((stats.rows, stats.undated), (2, 1));

    let restored = excel_read::read_workbook(&path).expect("workbook read");
    let names: Vec<&str> = restored
        .tables
        .iter()
        .map(|table| table.sheet_name.as_str())
        .collect();
    assert_eq!(names, vec!["SMART SHEET DATA", "PACELOGIC"]);
    assert_eq!(restored.sheet("SMART SHEET DATA"), Some(&smart));

    let pacelogic = restored.sheet("PACELOGIC").expect("sheet kept");
    assert_eq!(pacelogic.columns.last().map(String::as_str), Some("Title"));
    assert_eq!(pacelogic.record(0).get("Title"), &CellValue::from("Jane_Doe_2024-03-05"));
    assert_eq!(pacelogic.record(1).get("Title"), &CellValue::Empty);
}

#[test]
fn diff_titles_writes_not_found_sheets() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("monitoring.xlsx");
    let workbook = WorkbookData {
        tables: vec![
            table(
                "PACELOGIC",
                &["Title", "firstname"],
                vec![
                    vec!["a_b_2024-01-01".into(), "a".into()],
                    vec!["c_d_2024-01-02".into(), "c".into()],
                ],
            ),
            table(
                "SMART SHEET DATA",
                &["TITLE", "Status"],
                vec![
                    vec!["c_d_2024-01-02".into(), "open".into()],
                    vec!["x_y_2024-01-05".into(), "closed".into()],
                ],
            ),
        ],
    };
    excel_write::write_workbook(&path, &workbook).expect("input written");

    let diff = sync::diff_titles(&path, "SMART SHEET DATA", "PACELOGIC", "title")
        .expect("titles compared");
    assert_eq!(diff.missing_from_right.rows.len(), 1);
    assert_eq!(diff.missing_from_left.rows.len(), 1);

    let restored = excel_read::read_workbook(&path).expect("workbook read");
    assert_eq!(restored.tables.len(), 4);
    assert_eq!(restored.sheet("PACELOGIC"), workbook.sheet("PACELOGIC"));

    let not_in_pacelogic = restored
        .sheet("NOT_FOUND_IN_PACELOGIC")
        .expect("sheet written");
    assert_eq!(not_in_pacelogic.columns, vec!["title", "status"]);
    assert_eq!(not_in_pacelogic.record(0).get("title"), &CellValue::from("x_y_2024-01-05"));

    let not_in_smart = restored
        .sheet("NOT_FOUND_IN_SMART_SHEET_DATA")
        .expect("sheet written");
    assert_eq!(not_in_smart.record(0).get("firstname"), &CellValue::from("a"));
}

#[test]
fn diff_titles_rejects_sheet_without_title_column() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("monitoring.xlsx");
    let workbook = WorkbookData {
        tables: vec![
            table("PACELOGIC", &["name"], vec![vec!["a".into()]]),
            table("SMART SHEET DATA", &["title"], vec![vec!["a".into()]]),
        ],
    };
    excel_write::write_workbook(&path, &workbook).expect("input written");

    let err = sync::diff_titles(&path, "SMART SHEET DATA", "PACELOGIC", "title").unwrap_err();
    assert!(matches!(err, ToolError::MissingColumn { ref column, .. } if column == "title"));
}

#[test]
fn rejected_rows_report_their_worksheet_row_after_blank_rows() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("tes.xlsx");
    let workbook = WorkbookData {
        tables: vec![
            table(
                "old",
                &["id", "v"],
                vec![
                    vec!["k".into(), "1".into()],
                    vec![CellValue::Empty, CellValue::Empty],
                    vec![CellValue::Empty, "x".into()],
                ],
            ),
            table("new", &["id", "v"], vec![vec!["k".into(), "1".into()]]),
        ],
    };
    excel_write::write_workbook(&input, &workbook).expect("input written");

    let old = excel_read::read_sheet(&input, "old").expect("old read");
    assert_eq!(old.rows.len(), 2);
    assert_eq!(old.sheet_row(1), 4);

    let outputs = ReconcileOutputs {
        changes: temp_dir.path().join("changes.xlsx"),
        all: temp_dir.path().join("all.xlsx"),
        rejected: Some(temp_dir.path().join("rejected.xlsx")),
    };
    let report = sync::reconcile_workbooks(
        &SheetSource::new(&input, "old"),
        &SheetSource::new(&input, "new"),
        ReconcileConfig::new(["id"], ["v"]),
        &outputs,
    )
    .expect("reconciled");

    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].sheet_row, 4);
    let rejected = excel_read::read_sheet(
        outputs.rejected.as_deref().expect("rejected path"),
        "rejected",
    )
    .expect("rejected read");
    assert_eq!(rejected.record(0).get("v"), &CellValue::from("x"));
}

#[test]
fn diff_titles_replaces_its_sheets_on_rerun() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("monitoring.xlsx");
    let right_sheet = "PACELOGIC EXPORT 2024 Q1";
    let workbook = WorkbookData {
        tables: vec![
            table("SMART SHEET DATA", &["title"], vec![vec!["a".into()], vec!["b".into()]]),
            table(right_sheet, &["title"], vec![vec!["b".into()], vec!["c".into()]]),
        ],
    };
    excel_write::write_workbook(&path, &workbook).expect("input written");

    let first = sync::diff_titles(&path, "SMART SHEET DATA", right_sheet, "title")
        .expect("first diff");
    let second = sync::diff_titles(&path, "SMART SHEET DATA", right_sheet, "title")
        .expect("second diff");
    assert_eq!(first, second);
    assert_eq!(second.missing_from_right.sheet_name, "NOT_FOUND_IN_PACELOGIC_EXPORT_2");

    let restored = excel_read::read_workbook(&path).expect("workbook read");
    assert_eq!(restored.tables.len(), 4);
    let not_found = restored
        .sheet("NOT_FOUND_IN_PACELOGIC_EXPORT_2")
        .expect("sheet written");
    assert_eq!(not_found.rows.len(), 1);
    assert_eq!(not_found.record(0).get("title"), &CellValue::from("a"));
}

#[test]
fn failed_output_write_leaves_no_partial_results() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("tes.xlsx");
    let workbook = WorkbookData {
        tables: vec![
            table("old", &["id", "v"], vec![vec!["1".into(), "a".into()]]),
            table("new", &["id", "v"], vec![vec!["1".into(), "b".into()]]),
        ],
    };
    excel_write::write_workbook(&input, &workbook).expect("input written");

    let outputs = ReconcileOutputs {
        changes: temp_dir.path().join("changes.xlsx"),
        all: temp_dir.path().join("all.xlsx"),
        rejected: Some(temp_dir.path().join("missing_dir").join("rejected.xlsx")),
    };
    let err = sync::reconcile_workbooks(
        &SheetSource::new(&input, "old"),
        &SheetSource::new(&input, "new"),
        ReconcileConfig::new(["id"], ["v"]),
        &outputs,
    )
    .unwrap_err();

    assert!(matches!(err, ToolError::Io(_)));
    assert!(!outputs.changes.exists());
    assert!(!outputs.all.exists());
    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
        .expect("temporary directory listed")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("tes.xlsx")]);
}
