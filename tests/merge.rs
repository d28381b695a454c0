mod common;

use std::fs;
use std::time::Duration;

use bank_merge::{
    MergeError, run_merge, run_merge_with_timeout, spawn_merge, transform::custom::deterministic_id,
};
use common::{TestWorkspace, cell, read_table, row_where};

#[test]
fn single_customer_scenario_produces_stable_key() {
    let ws = TestWorkspace::new();
    ws.write(
        "source/customers.csv",
        "customerId,givenName\nC1,Alice\n",
    );
    ws.write("target/customers.csv", "encodedKey,firstName\n");
    ws.write_mapping(
        r#"{
        "source_dataset": {"files": {"Customer": "customers.csv"}},
        "target_dataset": {"files": {"Customer": "customers.csv"}},
        "mappings": [
            {"id": "k", "source": {"table": "Customer", "column": "customerId"},
             "target": {"table": "Customer", "column": "encodedKey"},
             "transform": {"type": "custom", "params": {"rule": "Generate UUID"}}},
            {"id": "n", "source": {"table": "Customer", "column": "givenName"},
             "target": {"table": "Customer", "column": "firstName"},
             "transform": {"type": "identity"}}
        ],
        "output_plans": [
            {"output_table": "Customer",
             "join": {"type": "full_outer", "left": {"table": "Customer", "on": ["customerId"]},
                      "right": {"table": "Customer", "on": ["id"]}},
             "use_mappings": ["k", "n"]}
        ]
    }"#,
    );

    let outcome = run_merge(&ws.request()).expect("merge succeeds");
    let (headers, rows) = read_table(&ws.output_dir().join("Merged_Customer.csv"));
    assert_eq!(headers, ["encodedKey", "firstName"]);
    assert_eq!(rows.len(), 1);
    assert_eq!(cell(&rows[0], "encodedKey"), Some(deterministic_id("C1").as_str()));
    assert_eq!(cell(&rows[0], "firstName"), Some("Alice"));
    assert!(outcome.report_error.is_none());

    let second = run_merge(&ws.request()).expect("rerun succeeds");
    let (_, rerun_rows) = read_table(&ws.output_dir().join("Merged_Customer.csv"));
    assert_eq!(rows, rerun_rows);
    assert_eq!(outcome.produced_files, second.produced_files);
}

#[test]
fn fixture_banks_merge_customers_with_conflict_resolution() {
    let ws = TestWorkspace::with_fixture_banks();
    let outcome = run_merge(&ws.request()).expect("merge succeeds");
    assert!(outcome.unplaced_columns.is_empty(), "{:?}", outcome.unplaced_columns);

    let (headers, rows) = read_table(&ws.output_dir().join("Merged_Customer.csv"));
    assert_eq!(
        headers,
        ["id", "encodedKey", "firstName", "lastName", "mobilePhone", "birthDate", "creationDate"]
    );
    assert_eq!(rows.len(), 3);

    let alice = row_where(&rows, "id", "C1");
    assert_eq!(cell(alice, "encodedKey"), Some(deterministic_id("C1").as_str()));
    assert_eq!(cell(alice, "lastName"), Some("SMITH"));
    assert_eq!(cell(alice, "mobilePhone"), Some("+15551234567"));
    assert_eq!(cell(alice, "birthDate"), Some("1990-03-04"));

    let bob = row_where(&rows, "id", "C2");
    assert_eq!(cell(bob, "firstName"), Some("Robert"));
    assert_eq!(cell(bob, "lastName"), Some("JONES"));
    assert_eq!(cell(bob, "mobilePhone"), Some("+442079460958"));
    assert_eq!(cell(bob, "birthDate"), Some("1985-01-01"));
    assert_eq!(cell(bob, "encodedKey"), Some(deterministic_id("C2").as_str()));

    let cara = row_where(&rows, "id", "C3");
    assert_eq!(cell(cara, "encodedKey"), Some("k3"));
    assert_eq!(cell(cara, "lastName"), Some("Doe"));
}

#[test]
fn fixture_banks_preserve_stray_fields_in_side_table() {
    let ws = TestWorkspace::with_fixture_banks();
    run_merge(&ws.request()).expect("merge succeeds");
    let (headers, rows) = read_table(&ws.output_dir().join("Merged_Customer_Extras.csv"));
    assert_eq!(headers, ["customerId", "nickname"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(cell(row_where(&rows, "customerId", "C1"), "nickname"), Some("Ally"));
    assert_eq!(cell(row_where(&rows, "customerId", "C2"), "nickname"), None);
}

#[test]
fn fixture_banks_assemble_deposit_transactions() {
    let ws = TestWorkspace::with_fixture_banks();
    run_merge(&ws.request()).expect("merge succeeds");
    let (headers, rows) =
        read_table(&ws.output_dir().join("Merged_Deposit_Account_Transactions.csv"));
    assert_eq!(
        headers,
        ["encodedKey", "parentAccountKey", "transactionId", "amount"]
    );
    assert_eq!(rows.len(), 4);
    assert_eq!(cell(&rows[0], "encodedKey"), Some("existing-1"));

    let t1 = row_where(&rows, "transactionId", "T1");
    assert_eq!(cell(t1, "encodedKey"), Some(deterministic_id("deposit_tx_T1").as_str()));
    assert_eq!(
        cell(t1, "parentAccountKey"),
        Some(deterministic_id("deposit accounts_A1").as_str())
    );
    assert_eq!(cell(t1, "amount"), Some("10.46"));
    assert_eq!(cell(row_where(&rows, "transactionId", "T2"), "amount"), Some("abc"));
    assert_eq!(
        cell(row_where(&rows, "transactionId", "T9"), "parentAccountKey"),
        Some(deterministic_id("deposit accounts_F1").as_str())
    );
}

#[test]
fn report_files_describe_the_run() {
    let ws = TestWorkspace::with_fixture_banks();
    let outcome = run_merge(&ws.request()).expect("merge succeeds");

    let doc_path = ws.output_dir().join("MERGE_DOCUMENTATION.md");
    let json_path = ws.output_dir().join("merge_report.json");
    assert!(outcome.produced_files.contains(&doc_path));
    assert!(outcome.produced_files.contains(&json_path));

    let doc = fs::read_to_string(&doc_path).unwrap();
    assert!(doc.contains("merged banking data from Bank1 and Bank2"));
    assert!(doc.contains("- **Customer.mobilePhone**: Normalized to E.164"));
    assert!(doc.contains("- **Total Mappings**: 9"));
    assert!(doc.contains("Mapping `tx-amount`: 1 of 3 value(s) kept unchanged"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(report["statistics"]["total_mappings"], 9);
    let customer = report["tables"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "Customer")
        .unwrap();
    assert_eq!(customer["records"], 3);
    assert_eq!(customer["sha256"].as_str().map(str::len), Some(64));
    assert_eq!(report["plans"][0]["mode"], "joined");
    assert_eq!(report["plans"][0]["matched_pairs"], 1);
}

#[test]
fn missing_files_are_tolerated() {
    let ws = TestWorkspace::with_fixture_banks();
    fs::remove_file(ws.target_dir().join("customers.csv")).unwrap();
    let outcome = run_merge(&ws.request()).expect("merge succeeds");
    let customer = outcome.tables.iter().find(|t| t.name == "Customer").unwrap();
    assert_eq!(customer.rows, 2);
}

#[test]
fn unparseable_mapping_is_fatal() {
    let ws = TestWorkspace::new();
    ws.write_mapping("{ not json");
    let err = run_merge(&ws.request()).unwrap_err();
    assert!(matches!(err, MergeError::MappingParse { .. }));
    assert!(!ws.output_dir().exists());
}

#[test]
fn output_directory_that_cannot_be_created_is_fatal() {
    let ws = TestWorkspace::with_fixture_banks();
    ws.write("blocker", "file in the way");
    let mut request = ws.request();
    request.output_dir = ws.path().join("blocker").join("out");
    assert!(matches!(run_merge(&request), Err(MergeError::OutputDir { .. })));
}

#[test]
fn off_thread_invocations_return_the_same_outcome() {
    let ws = TestWorkspace::with_fixture_banks();
    let spawned = spawn_merge(ws.request()).join().expect("worker joined").unwrap();
    let waited = run_merge_with_timeout(ws.request(), Duration::from_secs(60)).unwrap();
    assert_eq!(spawned.produced_files, waited.produced_files);
}

fn customer_spec(mappings: &str, use_mappings: &str) -> String {
    format!(
        r#"{{
        "source_dataset": {{"files": {{"Customer": "customers.csv"}}}},
        "target_dataset": {{"files": {{"Customer": "customers.csv"}}}},
        "mappings": [{mappings}],
        "output_plans": [
            {{"output_table": "Customer",
             "join": {{"type": "full_outer", "left": {{"table": "Customer", "on": ["customerId"]}},
                      "right": {{"table": "Customer", "on": ["id"]}}}},
             "use_mappings": [{use_mappings}]}}
        ]
    }}"#
    )
}

#[test]
fn second_mapping_onto_a_filled_column_is_reported_unplaced() {
    let ws = TestWorkspace::new();
    ws.write("source/customers.csv", "customerId,givenName,nickname\nC1,Alice,Ally\n");
    ws.write("target/customers.csv", "id,firstName\n");
    ws.write_mapping(&customer_spec(
        r#"{"id": "i", "source": {"table": "Customer", "column": "customerId"},
            "target": {"table": "Customer", "column": "id"}},
           {"id": "g", "source": {"table": "Customer", "column": "givenName"},
            "target": {"table": "Customer", "column": "firstName"}},
           {"id": "n", "source": {"table": "Customer", "column": "nickname"},
            "target": {"table": "Customer", "column": "firstName"}}"#,
        r#""i", "g", "n""#,
    ));

    let outcome = run_merge(&ws.request()).expect("merge succeeds");
    let (_, rows) = read_table(&ws.output_dir().join("Merged_Customer.csv"));
    assert_eq!(cell(&rows[0], "firstName"), Some("Alice"));
    assert_eq!(outcome.unplaced_columns, ["Customer.nickname"]);
}

#[test]
fn identity_mappings_keep_the_source_text() {
    let ws = TestWorkspace::new();
    ws.write(
        "source/customers.csv",
        "customerId,account,phone,rate\nC1,12345678901234567890,+15551234567,1.50\nC2,00042,5551234567,2\n",
    );
    ws.write("target/customers.csv", "id,account,phone,rate\n");
    let mappings = ["customerId:id", "account:account", "phone:phone", "rate:rate"]
        .iter()
        .map(|pair| {
            let (source, target) = pair.split_once(':').unwrap();
            format!(
                r#"{{"id": "{source}", "source": {{"table": "Customer", "column": "{source}"}},
                    "target": {{"table": "Customer", "column": "{target}"}},
                    "transform": {{"type": "identity"}}}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    ws.write_mapping(&customer_spec(&mappings, r#""customerId", "account", "phone", "rate""#));

    run_merge(&ws.request()).expect("merge succeeds");
    let (_, rows) = read_table(&ws.output_dir().join("Merged_Customer.csv"));
    let first = row_where(&rows, "id", "C1");
    assert_eq!(cell(first, "account"), Some("12345678901234567890"));
    assert_eq!(cell(first, "phone"), Some("+15551234567"));
    assert_eq!(cell(first, "rate"), Some("1.50"));
    let second = row_where(&rows, "id", "C2");
    assert_eq!(cell(second, "account"), Some("00042"));
    assert_eq!(cell(second, "phone"), Some("5551234567"));
    assert_eq!(cell(second, "rate"), Some("2"));
}
