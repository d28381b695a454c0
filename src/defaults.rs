//! Built-in recipe fragments for the two mock bank exports, used whenever the mapping
//! specification leaves the corresponding section out.

use crate::mapping::{
    AppendPlan, DedupeSpec, DedupeStrategy, DerivedKey, JoinKind, JoinSide, JoinSpec,
    MappingSpecification, OutputPlan,
};

pub const SOURCE_FILES: &[(&str, &str)] = &[
    ("Customer", "Bank1_Mock_Customer.xlsx"),
    ("CurSav Accounts", "Bank1_Mock_CurSav_Accounts.xlsx"),
    ("Fixed Term Accounts", "Bank1_Mock_FixedTerm_Accounts.xlsx"),
    ("Loan Accounts", "Bank1_Mock_Loan_Accounts.xlsx"),
    ("CurSav Account Transactions", "Bank1_Mock_CurSav_Transactions.csv"),
    ("Fixed Term Account Transactions", "Bank1_Mock_FixedTerm_Transactions.csv"),
    ("Loan Account Transactions", "Bank1_Mock_Loan_Transactions.csv"),
];

pub const TARGET_FILES: &[(&str, &str)] = &[
    ("Customer", "Bank2_Mock_Customer.xlsx"),
    ("Addresses", "Bank2_Mock_Addresses.xlsx"),
    ("Identifications", "Bank2_Mock_Identifications.xlsx"),
    ("Deposit Accounts", "Bank2_Mock_Deposit_Accounts.xlsx"),
    ("Loan Accounts", "Bank2_Mock_Loan_Accounts.xlsx"),
    ("Deposit Account Transactions", "Bank2_Mock_Deposit_Transactions.xlsx"),
    ("Loan Account Transactions", "Bank2_Mock_Loan_Transactions.xlsx"),
];

/// Natural keys a synthetic primary key can be derived from, in priority order, and
/// whether the seed is salted with the output table name.
pub const NATURAL_KEYS: &[(&str, bool)] = &[("customerId", false), ("accountId", true)];

/// `(output table, left table, left key)` for the plans derived when none are declared.
const DEFAULT_PLANS: &[(&str, &str, &str)] = &[
    ("Customer", "Customer", "customerId"),
    ("Deposit Accounts", "CurSav Accounts", "accountId"),
    ("Loan Accounts", "Loan Accounts", "accountId"),
];

/// One full-outer plan per known target table that the target dataset declares, each
/// consuming every mapping aimed at that table.
pub fn output_plans(spec: &MappingSpecification) -> Vec<OutputPlan> {
    let target_files = spec.target_files();
    DEFAULT_PLANS
        .iter()
        .filter(|(output, _, _)| target_files.contains_key(*output))
        .map(|(output, left, left_key)| OutputPlan {
            output_table: output.to_string(),
            join: JoinSpec {
                kind: JoinKind::FullOuter,
                left: JoinSide {
                    table: left.to_string(),
                    on: vec![left_key.to_string()],
                },
                right: JoinSide {
                    table: output.to_string(),
                    on: vec!["id".to_string()],
                },
            },
            dedupe: DedupeSpec {
                keys: vec!["id".to_string()],
                strategy: DedupeStrategy::PreferNonNull,
                tie_breaker: Some("creationDate".to_string()),
            },
            use_mappings: spec
                .mappings_for_table(output)
                .into_iter()
                .map(|m| m.id.clone())
                .collect(),
        })
        .collect()
}

fn key(column: &str, from: &str, namespace: Option<&str>) -> DerivedKey {
    DerivedKey {
        column: column.to_string(),
        from: from.to_string(),
        namespace: namespace.map(str::to_string),
    }
}

/// Normalized child tables split out of the customer record and the transaction
/// ledgers assembled from several source ledgers. Parent-key namespaces match the
/// salts used when the parent tables' own keys are generated.
pub fn append_plans() -> Vec<AppendPlan> {
    vec![
        AppendPlan {
            output_table: "Addresses".into(),
            sources: vec!["Customer".into()],
            keys: vec![
                key("encodedKey", "customerId", Some("addresses")),
                key("parentKey", "customerId", None),
            ],
        },
        AppendPlan {
            output_table: "Identifications".into(),
            sources: vec!["Customer".into()],
            keys: vec![
                key("encodedKey", "customerId", Some("identifications")),
                key("clientKey", "customerId", None),
            ],
        },
        AppendPlan {
            output_table: "Deposit Account Transactions".into(),
            sources: vec![
                "CurSav Account Transactions".into(),
                "Fixed Term Account Transactions".into(),
            ],
            keys: vec![
                key("encodedKey", "transactionReference", Some("deposit_tx")),
                key("parentAccountKey", "accountId", Some("deposit accounts")),
            ],
        },
        AppendPlan {
            output_table: "Loan Account Transactions".into(),
            sources: vec!["Loan Account Transactions".into()],
            keys: vec![
                key("encodedKey", "transactionReference", Some("loan_tx")),
                key("parentAccountKey", "accountId", Some("loan accounts")),
            ],
        },
    ]
}
