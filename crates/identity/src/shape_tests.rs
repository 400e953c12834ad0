// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{ShapeValidator, UnmatchedFields};

fn registration_shape() -> ShapeValidator {
    ShapeValidator::new().require("clientId").require("clientSecret").optional("issuedAt")
}

#[test]
fn absent_value_fails() {
    assert!(!registration_shape().evaluate(None, UnmatchedFields::Optional));
}

#[test]
fn non_object_fails() {
    let value = json!(["clientId", "clientSecret"]);
    assert!(!registration_shape().evaluate(Some(&value), UnmatchedFields::Optional));
}

#[test]
fn exact_required_fields_pass_strict_policy() {
    let value = json!({ "clientId": "id", "clientSecret": "secret" });
    assert!(registration_shape().evaluate(Some(&value), UnmatchedFields::Disallow));
}

#[test]
fn extra_field_fails_strict_policy_only() {
    let value = json!({ "clientId": "id", "clientSecret": "secret", "extra": 1 });
    let shape = registration_shape();
    assert!(!shape.evaluate(Some(&value), UnmatchedFields::Disallow));
    assert!(shape.evaluate(Some(&value), UnmatchedFields::Optional));
}

#[yare::parameterized(
    missing_required = { json!({ "clientId": "id" }) },
    null_required = { json!({ "clientId": "id", "clientSecret": null }) },
    disallowed_present = { json!({ "clientId": "id", "clientSecret": "s", "sso_role_name": "r" }) },
)]
fn rule_violations_fail(value: serde_json::Value) {
    let shape = registration_shape().disallow("sso_role_name");
    assert!(!shape.evaluate(Some(&value), UnmatchedFields::Optional));
}

#[test]
fn optional_field_may_be_present_under_strict_policy() {
    let value = json!({ "clientId": "id", "clientSecret": "s", "issuedAt": "2026-01-01T00:00:00Z" });
    assert!(registration_shape().evaluate(Some(&value), UnmatchedFields::Disallow));
}

#[test]
fn later_rule_replaces_earlier_one() {
    let shape = ShapeValidator::new().require("a").optional("a");
    let value = json!({});
    assert!(shape.evaluate(Some(&value), UnmatchedFields::Optional));
}
