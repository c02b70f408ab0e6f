//! Payload schemas of client-submitted events
//!
//! Each scope accepts a fixed set of event types. Payloads are parsed
//! strictly: unknown fields, wrong types and missing required fields are
//! all rejected, then field constraints are checked with `validator`.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::ValidationIssue;
use crate::model::parse_client_timestamp;
use crate::scope::Scope;

pub const INVENTORY_ADJUSTMENT: &str = "inventory.adjustment";
pub const TICKET_CHECKIN: &str = "ticket.checkin";

/// Stock count change reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InventoryAdjustmentPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub item_id: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub delta: i64,
    /// Absolute quantity after the adjustment
    #[validate(range(min = 0, message = "must not be negative"))]
    pub quantity: i64,
    #[validate(custom(function = "validate_timestamp"))]
    pub adjusted_at: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub source: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckinStatus {
    #[serde(rename = "checked_in")]
    CheckedIn,
}

/// Check-in performed offline by a scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TicketCheckinPayload {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub ticket_id: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub code: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub event_id: String,
    pub status: CheckinStatus,
    #[validate(custom(function = "validate_timestamp"))]
    pub attempted_at: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub source: String,
}

/// A payload that passed its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    InventoryAdjustment(InventoryAdjustmentPayload),
    TicketCheckin(TicketCheckinPayload),
}

fn validate_timestamp(value: &str) -> Result<(), ValidationError> {
    if parse_client_timestamp(value).is_some() {
        Ok(())
    } else {
        let mut err = ValidationError::new("timestamp");
        err.message = Some("must be an ISO 8601 timestamp".into());
        Err(err)
    }
}

/// Validate the payload of event `index` against the schema for its type
pub fn parse_payload(
    index: usize,
    scope: Scope,
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<EventPayload, Vec<ValidationIssue>> {
    match (scope, event_type) {
        (Scope::Inventory, INVENTORY_ADJUSTMENT) => {
            strict::<InventoryAdjustmentPayload>(index, payload).map(EventPayload::InventoryAdjustment)
        }
        (Scope::Tickets, TICKET_CHECKIN) => {
            strict::<TicketCheckinPayload>(index, payload).map(EventPayload::TicketCheckin)
        }
        _ => Err(vec![ValidationIssue::event(
            index,
            "type",
            format!("Unsupported event type '{event_type}' for scope '{scope}'"),
        )]),
    }
}

fn strict<T>(index: usize, payload: &serde_json::Value) -> Result<T, Vec<ValidationIssue>>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let parsed: T = serde_json::from_value(payload.clone())
        .map_err(|e| vec![ValidationIssue::event(index, "payload", e.to_string())])?;
    parsed
        .validate()
        .map_err(|errors| field_issues(index, &errors))?;
    Ok(parsed)
}

fn field_issues(index: usize, errors: &ValidationErrors) -> Vec<ValidationIssue> {
    let mut issues: Vec<ValidationIssue> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            let path = format!("payload.{}", camel_case(&field));
            field_errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), ToString::to_string);
                ValidationIssue::event(index, path.clone(), message)
            })
        })
        .collect();
    // field_errors() is a HashMap
    issues.sort_by(|a, b| a.path.cmp(&b.path));
    issues
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adjustment() -> serde_json::Value {
        json!({
            "itemId": "prop-skull",
            "delta": -1,
            "quantity": 3,
            "adjustedAt": "2025-01-01T10:00:00Z",
            "source": "stocktake"
        })
    }

    fn checkin() -> serde_json::Value {
        json!({
            "ticketId": "t-1",
            "code": "ABC123",
            "eventId": "premiere",
            "status": "checked_in",
            "attemptedAt": "2025-01-01T19:00:00Z",
            "source": "scanner"
        })
    }

    #[test]
    fn test_valid_payloads() {
        let parsed = parse_payload(0, Scope::Inventory, INVENTORY_ADJUSTMENT, &adjustment()).unwrap();
        match parsed {
            EventPayload::InventoryAdjustment(p) => {
                assert_eq!(p.item_id, "prop-skull");
                assert_eq!(p.quantity, 3);
            }
            EventPayload::TicketCheckin(_) => panic!("wrong payload kind"),
        }
        assert!(parse_payload(0, Scope::Tickets, TICKET_CHECKIN, &checkin()).is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut payload = adjustment();
        payload["colour"] = json!("red");
        let issues = parse_payload(2, Scope::Inventory, INVENTORY_ADJUSTMENT, &payload).unwrap_err();
        assert_eq!(issues.len(), 1);
        let issue = issues.first().unwrap();
        assert_eq!(issue.event_index, Some(2));
        assert_eq!(issue.path, "payload");
        assert!(issue.message.contains("colour"));
    }

    #[test]
    fn test_field_constraints() {
        let mut payload = adjustment();
        payload["quantity"] = json!(-4);
        payload["itemId"] = json!("");
        payload["adjustedAt"] = json!("soon");
        let issues = parse_payload(0, Scope::Inventory, INVENTORY_ADJUSTMENT, &payload).unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["payload.adjustedAt", "payload.itemId", "payload.quantity"]
        );
    }

    #[test]
    fn test_non_integer_delta_rejected() {
        let mut payload = adjustment();
        payload["delta"] = json!(1.5);
        assert!(parse_payload(0, Scope::Inventory, INVENTORY_ADJUSTMENT, &payload).is_err());
    }

    #[test]
    fn test_checkin_status_literal() {
        let mut payload = checkin();
        payload["status"] = json!("unused");
        assert!(parse_payload(0, Scope::Tickets, TICKET_CHECKIN, &payload).is_err());
    }

    #[test]
    fn test_type_must_match_scope() {
        let issues = parse_payload(1, Scope::Tickets, INVENTORY_ADJUSTMENT, &adjustment()).unwrap_err();
        assert_eq!(issues.first().unwrap().path, "type");
        assert!(parse_payload(0, Scope::Inventory, "inventory.deleted", &adjustment()).is_err());
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("adjusted_at"), "adjustedAt");
        assert_eq!(camel_case("source"), "source");
    }
}
