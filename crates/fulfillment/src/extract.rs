//! Ordered extraction rules for courier aggregator responses.
//!
//! The aggregator returns the same facts at different depths depending on the
//! endpoint (top level, under `data`, under `shipments[0]`, under `order`).
//! Each lookup walks its rule list in order and returns the first present,
//! non-empty value. Numbers are rendered as strings.

use serde_json::{Map, Value};

const ORDER_ID: &[&str] = &["/order_id", "/data/order_id", "/id"];

const SHIPMENT_ID: &[&str] = &[
    "/shipment_id",
    "/data/shipment_id",
    "/shipments/0/id",
    "/data/shipments/0/id",
    "/shipments/0/shipment_id",
];

const AWB_DIRECT: &[&str] = &[
    "/awb_code",
    "/awb",
    "/data/awb_code",
    "/data/awb",
    "/order/awb_code",
    "/order/awb",
    "/data/order/awb_code",
    "/data/order/awb",
    "/shipments/0/awb_code",
    "/shipments/0/awb",
    "/data/shipments/0/awb_code",
    "/data/shipments/0/awb",
];

const AWB_NESTED_SHIPMENT: &[&str] = &["/order/shipments/0", "/data/order/shipments/0"];

const AWB_LATE: &[&str] = &["/response/data/awb_code", "/tracking_data/awb"];

const CARRIER: &[&str] = &[
    "/courier_name",
    "/data/courier_name",
    "/shipments/0/courier_name",
    "/data/shipments/0/courier_name",
    "/response/data/courier_name",
];

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_of(doc: &Value, rules: &[&str]) -> Option<String> {
    rules
        .iter()
        .find_map(|ptr| doc.pointer(ptr).and_then(scalar))
}

fn awb_of(shipment: &Value) -> Option<String> {
    first_of(shipment, &["/awb_code", "/awb"])
}

pub fn external_order_id(doc: &Value) -> Option<String> {
    first_of(doc, ORDER_ID)
}

pub fn external_shipment_id(doc: &Value) -> Option<String> {
    first_of(doc, SHIPMENT_ID)
}

pub fn tracking_number(doc: &Value) -> Option<String> {
    if let Some(awb) = first_of(doc, AWB_DIRECT) {
        return Some(awb);
    }
    for list in ["/shipments", "/data/shipments"] {
        if let Some(Value::Array(items)) = doc.pointer(list) {
            if let Some(awb) = items.iter().find_map(awb_of) {
                return Some(awb);
            }
        }
    }
    AWB_NESTED_SHIPMENT
        .iter()
        .find_map(|ptr| doc.pointer(ptr).and_then(awb_of))
        .or_else(|| first_of(doc, AWB_LATE))
}

pub fn carrier_name(doc: &Value) -> Option<String> {
    first_of(doc, CARRIER)
}

/// Facts pulled out of one aggregator response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipmentSnapshot {
    pub external_order_id: Option<String>,
    pub external_shipment_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

impl ShipmentSnapshot {
    pub fn from_response(doc: &Value) -> Self {
        Self {
            external_order_id: external_order_id(doc),
            external_shipment_id: external_shipment_id(doc),
            tracking_number: tracking_number(doc),
            carrier: carrier_name(doc),
        }
    }
}

/// Courier companies from an assign or serviceability response.
pub fn courier_options(doc: &Value) -> Vec<crate::courier::CourierOption> {
    let list = match doc {
        Value::Array(items) => Some(items),
        _ => ["/data", "/data/available_courier_companies", "/available_courier_companies", "/data/data"]
            .iter()
            .find_map(|ptr| doc.pointer(ptr).and_then(Value::as_array)),
    };
    list.map(|items| items.iter().filter_map(crate::courier::CourierOption::from_value).collect())
        .unwrap_or_default()
}

/// Orders from a list response: a bare array, `data` (array, `data.orders`,
/// `data.data`) or `orders`.
pub fn order_list(doc: &Value) -> Vec<Value> {
    let list = match doc {
        Value::Array(items) => Some(items),
        _ => match doc.get("data") {
            Some(Value::Array(items)) => Some(items),
            Some(data) if !data.is_null() => data
                .get("orders")
                .and_then(Value::as_array)
                .or_else(|| data.get("data").and_then(Value::as_array)),
            _ => doc.get("orders").and_then(Value::as_array),
        },
    };
    list.cloned().unwrap_or_default()
}

fn entry_key_matches(entry: &Value, key: &str) -> bool {
    ["/id", "/order_id", "/order/id", "/order/order_id"]
        .iter()
        .filter_map(|ptr| entry.pointer(ptr).and_then(scalar))
        .any(|candidate| candidate == key)
}

/// Find the entry whose id or order id equals `key`. A nested `order` object
/// is flattened into the entry, with the entry's own fields winning.
pub fn find_order_in_list(list: &[Value], key: &str) -> Option<Value> {
    let key = key.trim();
    let found = list.iter().find(|entry| entry_key_matches(entry, key))?;
    match (found.get("order"), found) {
        (Some(Value::Object(inner)), Value::Object(outer)) => {
            let mut flat: Map<String, Value> = inner.clone();
            for (k, v) in outer {
                flat.insert(k.clone(), v.clone());
            }
            Some(Value::Object(flat))
        }
        _ => Some(found.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_from_create_response_top_level() {
        let doc = json!({"order_id": 123456, "shipment_id": 987, "status": "NEW"});
        assert_eq!(external_order_id(&doc).as_deref(), Some("123456"));
        assert_eq!(external_shipment_id(&doc).as_deref(), Some("987"));
        assert_eq!(tracking_number(&doc), None);
    }

    #[test]
    fn ids_from_nested_data_and_shipments() {
        let doc = json!({"data": {"order_id": "SR-9", "shipments": [{"id": 55}]}});
        assert_eq!(external_order_id(&doc).as_deref(), Some("SR-9"));
        assert_eq!(external_shipment_id(&doc).as_deref(), Some("55"));

        let doc = json!({"id": 77, "shipments": [{"shipment_id": 88}]});
        assert_eq!(external_order_id(&doc).as_deref(), Some("77"));
        assert_eq!(external_shipment_id(&doc).as_deref(), Some("88"));
    }

    #[test]
    fn awb_from_first_shipment() {
        let doc = json!({"id": 1, "shipments": [{"id": 2, "awb_code": "AWB123", "courier_name": "Delhivery"}]});
        assert_eq!(tracking_number(&doc).as_deref(), Some("AWB123"));
        assert_eq!(carrier_name(&doc).as_deref(), Some("Delhivery"));
    }

    #[test]
    fn empty_awb_is_skipped_for_later_rules() {
        let doc = json!({"awb_code": "  ", "data": {"awb": "AWB-D"}});
        assert_eq!(tracking_number(&doc).as_deref(), Some("AWB-D"));
    }

    #[test]
    fn awb_from_any_shipment_in_the_list() {
        let doc = json!({"shipments": [{"id": 1, "awb_code": ""}, {"id": 2, "awb": "AWB-2"}]});
        assert_eq!(tracking_number(&doc).as_deref(), Some("AWB-2"));
    }

    #[test]
    fn awb_from_nested_order_shipments() {
        let doc = json!({"data": {"order": {"shipments": [{"awb_code": "AWB-O"}]}}});
        assert_eq!(tracking_number(&doc).as_deref(), Some("AWB-O"));
    }

    #[test]
    fn awb_from_assign_response() {
        let doc = json!({"awb_assign_status": 1, "response": {"data": {"awb_code": "AWB-A", "courier_name": "Xpress"}}});
        assert_eq!(tracking_number(&doc).as_deref(), Some("AWB-A"));
        assert_eq!(carrier_name(&doc).as_deref(), Some("Xpress"));
    }

    #[test]
    fn awb_from_tracking_data() {
        let doc = json!({"tracking_data": {"awb": 998877}});
        assert_eq!(tracking_number(&doc).as_deref(), Some("998877"));
    }

    #[test]
    fn snapshot_collects_everything() {
        let doc = json!({"order_id": 5, "shipment_id": 6, "awb_code": "A", "courier_name": "C"});
        assert_eq!(
            ShipmentSnapshot::from_response(&doc),
            ShipmentSnapshot {
                external_order_id: Some("5".into()),
                external_shipment_id: Some("6".into()),
                tracking_number: Some("A".into()),
                carrier: Some("C".into()),
            }
        );
    }

    #[test]
    fn courier_options_from_every_known_shape() {
        let shapes = [
            json!([{"id": 1, "name": "A"}]),
            json!({"data": [{"id": 1, "name": "A"}]}),
            json!({"data": {"available_courier_companies": [{"courier_company_id": 1, "courier_name": "A"}]}}),
            json!({"available_courier_companies": [{"courier_id": 1, "name": "A"}]}),
            json!({"data": {"data": [{"id": 1, "name": "A"}]}}),
        ];
        for doc in shapes {
            let opts = courier_options(&doc);
            assert_eq!(opts.len(), 1, "{doc}");
            assert_eq!(opts[0].id, "1");
            assert_eq!(opts[0].name.as_deref(), Some("A"));
        }
        assert!(courier_options(&json!({"message": "no couriers"})).is_empty());
    }

    #[test]
    fn order_list_shapes() {
        assert_eq!(order_list(&json!([{"id": 1}])).len(), 1);
        assert_eq!(order_list(&json!({"data": [{"id": 1}, {"id": 2}]})).len(), 2);
        assert_eq!(order_list(&json!({"data": {"orders": [{"id": 1}]}})).len(), 1);
        assert_eq!(order_list(&json!({"data": {"data": [{"id": 1}]}})).len(), 1);
        assert_eq!(order_list(&json!({"orders": [{"id": 1}]})).len(), 1);
        assert!(order_list(&json!({"status": 200})).is_empty());
    }

    #[test]
    fn list_lookup_matches_nested_ids_and_flattens() {
        let list = vec![
            json!({"id": 1, "order": {"order_id": "ORD-A"}}),
            json!({"channel": "web", "order": {"order_id": "ORD-B", "awb_code": "AWB-B", "channel": "inner"}}),
        ];
        let found = find_order_in_list(&list, "ORD-B").unwrap();
        assert_eq!(found["awb_code"], "AWB-B");
        assert_eq!(found["channel"], "web");
        assert_eq!(tracking_number(&found).as_deref(), Some("AWB-B"));

        assert!(find_order_in_list(&list, "1").is_some());
        assert!(find_order_in_list(&list, "ORD-Z").is_none());
    }
}
