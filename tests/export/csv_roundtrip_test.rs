//! CSV export round-trip: serialized rows re-parse to identical values.

use weaver::export::{csv_bytes, FlatRow};

fn row(pairs: &[(&str, &str)]) -> FlatRow {
    let mut r = FlatRow::new();
    for (c, v) in pairs {
        r.push(*c, *v);
    }
    r
}

#[test]
fn uniform_rows_round_trip() {
    let rows: Vec<FlatRow> = (0..5)
        .map(|i| {
            row(&[
                ("Customers_Record ID#", &i.to_string()),
                ("Customers_Customer Name", &format!("Customer {i}")),
                ("Tickets_Status", if i % 2 == 0 { "Open" } else { "Closed" }),
            ])
        })
        .collect();

    let bytes = csv_bytes(&rows).unwrap();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec![
            "Customers_Record ID#",
            "Customers_Customer Name",
            "Tickets_Status"
        ]
    );

    let parsed: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(parsed.len(), rows.len());
    for (record, original) in parsed.iter().zip(&rows) {
        for (i, header) in headers.iter().enumerate() {
            assert_eq!(record.get(i), original.get(header));
        }
    }
}

#[test]
fn embedded_delimiters_survive_the_round_trip() {
    let rows = vec![row(&[
        ("name", "Acme, Inc."),
        ("note", "first line\nsecond line"),
        ("quote", "she said \"hi\""),
    ])];
    let bytes = csv_bytes(&rows).unwrap();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let record = reader.records().next().unwrap().unwrap();
    assert_eq!(record.get(0), Some("Acme, Inc."));
    assert_eq!(record.get(1), Some("first line\nsecond line"));
    assert_eq!(record.get(2), Some("she said \"hi\""));
}
