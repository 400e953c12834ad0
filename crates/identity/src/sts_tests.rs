// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{to_iam_arn, AssumeRoleRequest, SESSION_DURATION_SECONDS};

#[yare::parameterized(
    assumed_role = {
        "arn:aws:sts::123456789012:assumed-role/Dev/session-1",
        "arn:aws:iam::123456789012:role/Dev"
    },
    gov_partition = {
        "arn:aws-us-gov:sts::123456789012:assumed-role/Ops/s",
        "arn:aws-us-gov:iam::123456789012:role/Ops"
    },
    iam_user = { "arn:aws:iam::123456789012:user/alice", "arn:aws:iam::123456789012:user/alice" },
    federated = {
        "arn:aws:sts::123456789012:federated-user/bob",
        "arn:aws:sts::123456789012:federated-user/bob"
    },
    not_an_arn = { "garbage", "garbage" },
)]
fn converts_assumed_role_arns(input: &str, expected: &str) {
    assert_eq!(to_iam_arn(input), expected);
}

#[test]
fn assume_role_request_defaults() {
    let request = AssumeRoleRequest::new("arn:aws:iam::123456789012:role/Dev");
    assert!(request.role_session_name.starts_with("session-"));
    assert_eq!(request.duration_seconds, SESSION_DURATION_SECONDS);
    assert_eq!(request.mfa, None);
}
