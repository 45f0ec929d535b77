//! Service-operation templates (spec §4.5), grounded on
//! `examples/original_source/pysfn/service_operations.py`.
//!
//! Each template names its bound parameters (in the order the call
//! lowerer binds positional/keyword arguments), the `CallAwsService`-
//! style resource it targets, and how to build the Task's `Parameters`
//! and `ResultSelector` from the already-lowered argument values (each
//! either a literal `Json` or a `{"...path...": true}`-tagged register
//! path produced by value lowering).
//!
//! DynamoDB builders are a SPEC_FULL supplement: the original only
//! stubs `dynamo_*` with no builder bodies. They are authored here in
//! the same shape as the S3/SQS builders.

use std::collections::HashMap;

use serde_json::{json, Value as Json};

use crate::error::{CompileError, CompileResult};
use crate::value::LoweredArg;

pub struct ServiceOperation {
    pub param_names: &'static [&'static str],
    pub label: &'static str,
    pub outputs: &'static [&'static str],
    pub build: fn(&HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>),
}

pub fn lookup(name: &str) -> Option<&'static ServiceOperation> {
    OPERATIONS.iter().find(|op_name| op_name.0 == name).map(|e| &e.1)
}

macro_rules! bind {
    ($args:expr, $name:literal) => {
        $args.get($name).expect(concat!("missing bound arg ", $name))
    };
}

fn s3_write_json(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "bucket").put(&mut params, "Bucket");
    bind!(args, "key").put(&mut params, "Key");
    bind!(args, "obj").put(&mut params, "Body");
    params.insert("ContentType".into(), json!("application/json"));
    (
        "arn:aws:states:::aws-sdk:s3:putObject".to_string(),
        Json::Object(params),
        Some(json!({ "ETag.$": "States.StringToJson($.ETag)" })),
    )
}

fn s3_read_json(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "bucket").put(&mut params, "Bucket");
    bind!(args, "key").put(&mut params, "Key");
    (
        "arn:aws:states:::aws-sdk:s3:getObject".to_string(),
        Json::Object(params),
        Some(json!({
            "Body.$": "States.StringToJson($.Body)",
            "LastModified.$": "$.LastModified",
            "ETag.$": "States.StringToJson($.ETag)",
        })),
    )
}

fn sqs_send_message(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "queue").put(&mut params, "QueueUrl");
    bind!(args, "message").put(&mut params, "MessageBody");
    if let Some(v) = args.get("message_deduplication_id") {
        v.put(&mut params, "MessageDeduplicationId");
    }
    if let Some(v) = args.get("message_group_id") {
        v.put(&mut params, "MessageGroupId");
    }
    (
        "arn:aws:states:::aws-sdk:sqs:sendMessage".to_string(),
        Json::Object(params),
        Some(json!({ "MessageId.$": "$.MessageId" })),
    )
}

fn sqs_receive_message(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "queue").put(&mut params, "QueueUrl");
    if let Some(v) = args.get("max_number_of_messages") {
        v.put(&mut params, "MaxNumberOfMessages");
    }
    if let Some(v) = args.get("visibility_timeout") {
        v.put(&mut params, "VisibilityTimeout");
    }
    if let Some(v) = args.get("wait_time_seconds") {
        v.put(&mut params, "WaitTimeSeconds");
    }
    (
        "arn:aws:states:::aws-sdk:sqs:receiveMessage".to_string(),
        Json::Object(params),
        Some(json!({ "Messages.$": "$.Messages" })),
    )
}

fn sqs_delete_message(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "queue").put(&mut params, "QueueUrl");
    bind!(args, "receipt_handle").put(&mut params, "ReceiptHandle");
    (
        "arn:aws:states:::aws-sdk:sqs:deleteMessage".to_string(),
        Json::Object(params),
        None,
    )
}

fn dynamo_write_item(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "table").put(&mut params, "TableName");
    bind!(args, "item").put(&mut params, "Item");
    (
        "arn:aws:states:::aws-sdk:dynamodb:putItem".to_string(),
        Json::Object(params),
        None,
    )
}

fn dynamo_read_item(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "table").put(&mut params, "TableName");
    bind!(args, "key").put(&mut params, "Key");
    (
        "arn:aws:states:::aws-sdk:dynamodb:getItem".to_string(),
        Json::Object(params),
        Some(json!({ "Item.$": "$.Item" })),
    )
}

fn dynamo_delete_item(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "table").put(&mut params, "TableName");
    bind!(args, "key").put(&mut params, "Key");
    (
        "arn:aws:states:::aws-sdk:dynamodb:deleteItem".to_string(),
        Json::Object(params),
        None,
    )
}

fn dynamo_update_item(args: &HashMap<&'static str, LoweredArg>) -> (String, Json, Option<Json>) {
    let mut params = serde_json::Map::new();
    bind!(args, "table").put(&mut params, "TableName");
    bind!(args, "key").put(&mut params, "Key");
    bind!(args, "attribute_updates").put(&mut params, "AttributeUpdates");
    (
        "arn:aws:states:::aws-sdk:dynamodb:updateItem".to_string(),
        Json::Object(params),
        Some(json!({ "Attributes.$": "$.Attributes" })),
    )
}

static OPERATIONS: &[(&str, ServiceOperation)] = &[
    (
        "s3_write_json",
        ServiceOperation {
            param_names: &["obj", "bucket", "key"],
            label: "S3 Write JSON",
            outputs: &["ETag"],
            build: s3_write_json,
        },
    ),
    (
        "s3_read_json",
        ServiceOperation {
            param_names: &["bucket", "key"],
            label: "S3 Read JSON",
            outputs: &["Body", "LastModified", "ETag"],
            build: s3_read_json,
        },
    ),
    (
        "sqs_send_message",
        ServiceOperation {
            param_names: &["queue", "message", "message_deduplication_id", "message_group_id"],
            label: "Send SQS Message",
            outputs: &["MessageId"],
            build: sqs_send_message,
        },
    ),
    (
        "sqs_receive_message",
        ServiceOperation {
            param_names: &["queue", "max_number_of_messages", "visibility_timeout", "wait_time_seconds"],
            label: "Receive SQS Message",
            outputs: &["Messages"],
            build: sqs_receive_message,
        },
    ),
    (
        "sqs_delete_message",
        ServiceOperation {
            param_names: &["queue", "receipt_handle"],
            label: "Delete SQS Message",
            outputs: &[],
            build: sqs_delete_message,
        },
    ),
    (
        "dynamo_write_item",
        ServiceOperation {
            param_names: &["table", "item"],
            label: "DynamoDB Write Item",
            outputs: &[],
            build: dynamo_write_item,
        },
    ),
    (
        "dynamo_read_item",
        ServiceOperation {
            param_names: &["table", "key"],
            label: "DynamoDB Read Item",
            outputs: &["Item"],
            build: dynamo_read_item,
        },
    ),
    (
        "dynamo_delete_item",
        ServiceOperation {
            param_names: &["table", "key"],
            label: "DynamoDB Delete Item",
            outputs: &[],
            build: dynamo_delete_item,
        },
    ),
    (
        "dynamo_update_item",
        ServiceOperation {
            param_names: &["table", "key", "attribute_updates"],
            label: "DynamoDB Update Item",
            outputs: &["Attributes"],
            build: dynamo_update_item,
        },
    ),
];

/// Binds positional + keyword lowered arguments to a template's declared
/// parameter names, by position then by name (mirrors call lowering's
/// general binding rule, spec §4.6.4).
pub fn bind_args(
    op: &ServiceOperation,
    positional: Vec<LoweredArg>,
    keyword: Vec<(String, LoweredArg)>,
) -> CompileResult<HashMap<&'static str, LoweredArg>> {
    let mut bound = HashMap::new();
    for (i, arg) in positional.into_iter().enumerate() {
        let name = op.param_names.get(i).ok_or_else(|| CompileError::ArityMismatch {
            expected: op.param_names.len(),
            actual: i + 1,
        })?;
        bound.insert(*name, arg);
    }
    for (k, arg) in keyword {
        let name = op
            .param_names
            .iter()
            .find(|n| **n == k)
            .ok_or_else(|| CompileError::UnknownCallee { name: k.clone() })?;
        bound.insert(*name, arg);
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_write_json_template_shapes_a_put_object_call() {
        let op = lookup("s3_write_json").unwrap();
        let bound = bind_args(
            op,
            vec![
                LoweredArg::Path("$.register.obj".into()),
                LoweredArg::Literal(json!("my-bucket")),
                LoweredArg::Path("$.register.key".into()),
            ],
            vec![],
        )
        .unwrap();
        let (resource, params, selector) = (op.build)(&bound);
        assert!(resource.contains("s3:putObject"));
        assert_eq!(params["Bucket"], json!("my-bucket"));
        assert_eq!(params["Body.$"], json!("$.register.obj"));
        assert!(selector.is_some());
    }

    #[test]
    fn dynamo_templates_are_registered() {
        assert!(lookup("dynamo_write_item").is_some());
        assert!(lookup("dynamo_read_item").is_some());
        assert!(lookup("dynamo_delete_item").is_some());
        assert!(lookup("dynamo_update_item").is_some());
    }
}
