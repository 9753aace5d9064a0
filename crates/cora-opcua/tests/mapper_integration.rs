// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Record discovery against an in-memory address space.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::mpsc;

use common::{client_config, init_test_logging, packtag, MockPlc, MockTransport};
use cora_opcua::client::{DataValue, OpcUaTransport, OpcUaValue, StatusCode};
use cora_opcua::{
    Alarm, AttributeReader, NodeBrowser, ObjectMapper, ProdConsumed, ProdDefectCount, ProdProcessed,
    StopReason, TimeZonePolicy,
};

async fn mapper_on(plc: &Arc<MockPlc>) -> (ObjectMapper, NodeBrowser) {
    init_test_logging();
    let transport = MockTransport::new(Arc::clone(plc));
    let (events, _rx) = mpsc::unbounded_channel();
    let session = transport
        .open_session(&client_config(), events)
        .await
        .expect("mock session opens");

    let timeout = Duration::from_secs(5);
    let browser = NodeBrowser::new(Arc::clone(&session), timeout);
    let reader = AttributeReader::new(session, browser.clone(), timeout, TimeZonePolicy::CentralEuropean);
    (ObjectMapper::new(browser.clone(), reader), browser)
}

#[tokio::test]
async fn test_indexed_alarms_follow_index_max() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let (mapper, browser) = mapper_on(&plc).await;

    let root = browser.find_child_by_name(&tags.admin, "Alarm").await;
    let alarms: Vec<Alarm> = mapper.populate(root.as_ref()).await;

    assert_eq!(alarms.len(), 3);
    assert_eq!(alarms.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(alarms[1].value, 20);
    assert_eq!(alarms[2].message, "Alarm 3");
    assert_eq!(alarms[0].category, 2);

    // January is CET, July is CEST.
    assert_eq!(
        alarms[0].date_time,
        vec![DateTime::parse_from_rfc3339("2025-01-15T10:30:00+01:00").unwrap()]
    );
    assert_eq!(
        alarms[0].ack_date_time,
        vec![DateTime::parse_from_rfc3339("2025-07-01T14:00:00.250+02:00").unwrap()]
    );
}

#[tokio::test]
async fn test_index_max_limits_indexed_children() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let root = plc.object(&tags.admin, "Consumed");
    plc.variable(&root, "IndexMax", OpcUaValue::Int32(1));
    for i in 0..3 {
        let item = plc.object(&root, &format!("Consumed[{i}]"));
        plc.variable(&item, "ID", OpcUaValue::Int32(i));
    }
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "Consumed").await;
    let records: Vec<ProdConsumed> = mapper.populate(node.as_ref()).await;

    assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1]);
}

#[tokio::test]
async fn test_index_max_as_numeric_string() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "ProdDefectiveCount").await;
    let defects: Vec<ProdDefectCount> = mapper.populate(node.as_ref()).await;

    assert_eq!(defects.len(), 2);
    assert_eq!((defects[0].id, defects[0].count, defects[0].acc_count), (3, 2, 20));
}

#[tokio::test]
async fn test_root_without_children_yields_one_default_record() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    plc.object(&tags.admin, "Empty");
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "Empty").await;
    let records: Vec<ProdProcessed> = mapper.populate(node.as_ref()).await;

    assert_eq!(records, vec![ProdProcessed::default()]);
}

#[tokio::test]
async fn test_flat_children_are_records() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "ProdProcessedCount").await;
    let processed: Vec<ProdProcessed> = mapper.populate(node.as_ref()).await;
    assert_eq!(processed, vec![ProdProcessed { count: 12, acc_count: 1200 }]);

    let node = browser.find_child_by_name(&tags.admin, "StopReason").await;
    let reasons: Vec<StopReason> = mapper.populate(node.as_ref()).await;
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].message, "Emergency stop");
    assert_eq!(reasons[0].value, 8);
    assert_eq!(reasons[0].date_time.len(), 1);
}

#[tokio::test]
async fn test_mismatched_and_unreadable_fields_keep_defaults() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let root = plc.object(&tags.admin, "Odd");
    let rec = plc.object(&root, "Rec");
    plc.variable(&rec, "ID", OpcUaValue::String("abc".into()));
    plc.variable(&rec, "Count", OpcUaValue::Int32(3));
    let acc = plc.variable(&rec, "AccCount", OpcUaValue::Int32(9));
    plc.set_data_value(&acc, DataValue::bad(StatusCode::BAD));
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "Odd").await;
    let records: Vec<ProdConsumed> = mapper.populate(node.as_ref()).await;

    assert_eq!(
        records,
        vec![ProdConsumed {
            id: 0,
            count: 3,
            acc_count: 0
        }]
    );
}

#[tokio::test]
async fn test_incomplete_timestamp_is_empty() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let root = plc.object(&tags.admin, "Partial");
    let alarm = plc.object(&root, "Partial[0]");
    plc.variable(&root, "IndexMax", OpcUaValue::Int32(0));
    plc.variable(&alarm, "ID", OpcUaValue::Int32(5));
    let dt = plc.object(&alarm, "DateTime");
    plc.variable(&dt, "DateTime[0]", OpcUaValue::Int32(2025));
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "Partial").await;
    let alarms: Vec<Alarm> = mapper.populate(node.as_ref()).await;

    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].id, 5);
    assert!(alarms[0].date_time.is_empty());
}

#[tokio::test]
async fn test_missing_root_yields_nothing() {
    let plc = MockPlc::new();
    let tags = packtag(&plc);
    let (mapper, browser) = mapper_on(&plc).await;

    let node = browser.find_child_by_name(&tags.admin, "NoSuchNode").await;
    assert!(node.is_none());
    let alarms: Vec<Alarm> = mapper.populate(node.as_ref()).await;
    assert!(alarms.is_empty());
}
