//! Prost-based codec using envoy-types.

use envoy_types::pb::envoy::admin::v3::ClientResourceStatus;
use envoy_types::pb::envoy::config::core::v3 as core;
use envoy_types::pb::envoy::r#type::matcher::v3 as matcher;
use envoy_types::pb::envoy::service::status::v3 as status;
use envoy_types::pb::google::protobuf;

use crate::message::{
    ClientConfig, ClientNode, NodeMatcher, ResourceAny, StatusRequest, StatusResponse,
    StringMatcher, StringPattern, StructMatcher, ValueMatcher, XdsConfigEntry,
};

/// Encode a [`StatusRequest`] into its protobuf form.
pub fn encode_request(request: &StatusRequest) -> status::ClientStatusRequest {
    status::ClientStatusRequest {
        node_matchers: request.node_matchers.iter().map(encode_node_matcher).collect(),
        node: Some(core::Node {
            id: request.node_id.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn encode_node_matcher(node_matcher: &NodeMatcher) -> matcher::NodeMatcher {
    matcher::NodeMatcher {
        node_id: node_matcher.node_id.as_ref().map(encode_string_matcher),
        node_metadatas: node_matcher
            .node_metadatas
            .iter()
            .map(encode_struct_matcher)
            .collect(),
    }
}

fn encode_struct_matcher(struct_matcher: &StructMatcher) -> matcher::StructMatcher {
    use matcher::struct_matcher::{path_segment::Segment, PathSegment};

    matcher::StructMatcher {
        path: struct_matcher
            .path
            .iter()
            .map(|segment| PathSegment {
                segment: Some(Segment::Key(segment.key.clone())),
            })
            .collect(),
        value: struct_matcher.value.as_ref().map(encode_value_matcher),
    }
}

fn encode_value_matcher(value: &ValueMatcher) -> matcher::ValueMatcher {
    use matcher::double_matcher;
    use matcher::value_matcher::{self, MatchPattern};

    let pattern = match value {
        ValueMatcher::NullMatch(_) => MatchPattern::NullMatch(value_matcher::NullMatch {}),
        ValueMatcher::DoubleMatch(double) => MatchPattern::DoubleMatch(matcher::DoubleMatcher {
            match_pattern: Some(double_matcher::MatchPattern::Exact(double.exact)),
        }),
        ValueMatcher::StringMatch(string) => {
            MatchPattern::StringMatch(encode_string_matcher(string))
        }
        ValueMatcher::BoolMatch(b) => MatchPattern::BoolMatch(*b),
        ValueMatcher::PresentMatch(b) => MatchPattern::PresentMatch(*b),
    };

    matcher::ValueMatcher {
        match_pattern: Some(pattern),
    }
}

fn encode_string_matcher(string: &StringMatcher) -> matcher::StringMatcher {
    use matcher::string_matcher::MatchPattern;

    let pattern = string.pattern.as_ref().map(|pattern| match pattern {
        StringPattern::Exact(s) => MatchPattern::Exact(s.clone()),
        StringPattern::Prefix(s) => MatchPattern::Prefix(s.clone()),
        StringPattern::Suffix(s) => MatchPattern::Suffix(s.clone()),
        StringPattern::Contains(s) => MatchPattern::Contains(s.clone()),
        StringPattern::SafeRegex(regex) => MatchPattern::SafeRegex(matcher::RegexMatcher {
            regex: regex.clone(),
            ..Default::default()
        }),
    });

    matcher::StringMatcher {
        match_pattern: pattern,
        ignore_case: string.ignore_case.unwrap_or(false),
    }
}

/// Decode a protobuf response into a [`StatusResponse`].
pub fn decode_response(response: status::ClientStatusResponse) -> StatusResponse {
    StatusResponse {
        clients: response.config.into_iter().map(decode_client_config).collect(),
    }
}

fn decode_client_config(config: status::ClientConfig) -> ClientConfig {
    ClientConfig {
        node: config.node.map(|node| ClientNode {
            id: node.id,
            metadata: node.metadata.map(struct_to_json).unwrap_or_default(),
        }),
        xds_configs: config
            .generic_xds_configs
            .into_iter()
            .map(decode_generic_xds_config)
            .collect(),
    }
}

fn decode_generic_xds_config(config: status::client_config::GenericXdsConfig) -> XdsConfigEntry {
    let config_status = status::ConfigStatus::try_from(config.config_status)
        .map(|s| s.as_str_name().to_string())
        .unwrap_or_else(|_| config.config_status.to_string());
    let client_status = ClientResourceStatus::try_from(config.client_status)
        .map(|s| s.as_str_name().to_string())
        .unwrap_or_else(|_| config.client_status.to_string());

    XdsConfigEntry {
        type_url: config.type_url,
        name: config.name,
        version_info: config.version_info,
        config_status,
        client_status,
        is_static_resource: config.is_static_resource,
        config: config.xds_config.map(|any| ResourceAny {
            type_url: any.type_url,
            value: any.value.into(),
        }),
    }
}

fn struct_to_json(s: protobuf::Struct) -> serde_json::Map<String, serde_json::Value> {
    s.fields
        .into_iter()
        .map(|(key, value)| (key, value_to_json(value)))
        .collect()
}

fn value_to_json(value: protobuf::Value) -> serde_json::Value {
    use protobuf::value::Kind;
    use serde_json::Value;

    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::NumberValue(n)) => {
            serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
        }
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(struct_to_json(s)),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PathSegment;
    use protobuf::value::Kind;

    fn string_value(s: &str) -> protobuf::Value {
        protobuf::Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_encode_request() {
        let request = StatusRequest {
            node_matchers: vec![NodeMatcher {
                node_id: Some(StringMatcher {
                    pattern: Some(StringPattern::SafeRegex("^a.*".to_string())),
                    ignore_case: Some(true),
                }),
                node_metadatas: vec![StructMatcher {
                    path: vec![PathSegment {
                        key: "TRAFFICDIRECTOR_GCP_PROJECT_NUMBER".to_string(),
                    }],
                    value: Some(ValueMatcher::StringMatch(StringMatcher::exact("123"))),
                }],
            }],
            node_id: "client-node".to_string(),
        };

        let encoded = encode_request(&request);
        assert_eq!(encoded.node.unwrap().id, "client-node");
        assert_eq!(encoded.node_matchers.len(), 1);

        let node_matcher = &encoded.node_matchers[0];
        let node_id = node_matcher.node_id.as_ref().unwrap();
        assert!(node_id.ignore_case);
        match &node_id.match_pattern {
            Some(matcher::string_matcher::MatchPattern::SafeRegex(regex)) => {
                assert_eq!(regex.regex, "^a.*");
            }
            other => panic!("unexpected pattern: {other:?}"),
        }

        let metadata = &node_matcher.node_metadatas[0];
        match &metadata.path[0].segment {
            Some(matcher::struct_matcher::path_segment::Segment::Key(key)) => {
                assert_eq!(key, "TRAFFICDIRECTOR_GCP_PROJECT_NUMBER");
            }
            other => panic!("unexpected segment: {other:?}"),
        }
        match &metadata.value.as_ref().unwrap().match_pattern {
            Some(matcher::value_matcher::MatchPattern::StringMatch(string)) => {
                assert_eq!(
                    string.match_pattern,
                    Some(matcher::string_matcher::MatchPattern::Exact("123".to_string()))
                );
                assert!(!string.ignore_case);
            }
            other => panic!("unexpected value matcher: {other:?}"),
        }
    }

    #[test]
    fn test_decode_response() {
        let metadata = protobuf::Struct {
            fields: [
                ("XDS_STREAM_TYPE".to_string(), string_value("ADS")),
                (
                    "ZONE".to_string(),
                    protobuf::Value {
                        kind: Some(Kind::NumberValue(3.0)),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        };

        let response = status::ClientStatusResponse {
            config: vec![status::ClientConfig {
                node: Some(core::Node {
                    id: "node-1".to_string(),
                    metadata: Some(metadata),
                    ..Default::default()
                }),
                generic_xds_configs: vec![status::client_config::GenericXdsConfig {
                    type_url: "type.googleapis.com/envoy.config.cluster.v3.Cluster".to_string(),
                    name: "cluster-a".to_string(),
                    version_info: "7".to_string(),
                    config_status: status::ConfigStatus::Stale as i32,
                    client_status: ClientResourceStatus::Acked as i32,
                    xds_config: Some(protobuf::Any {
                        type_url: "type.googleapis.com/envoy.config.cluster.v3.Cluster"
                            .to_string(),
                        value: b"fake-cluster-bytes".to_vec(),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let decoded = decode_response(response);
        assert_eq!(decoded.clients.len(), 1);

        let client = &decoded.clients[0];
        let node = client.node.as_ref().unwrap();
        assert_eq!(node.id, "node-1");
        assert_eq!(node.stream_type(), "ADS");
        assert_eq!(node.metadata["ZONE"], serde_json::json!(3.0));

        let entry = &client.xds_configs[0];
        assert_eq!(entry.name, "cluster-a");
        assert_eq!(entry.version_info, "7");
        assert_eq!(entry.config_status, "STALE");
        assert_eq!(entry.client_status, "ACKED");
        assert_eq!(
            entry.config.as_ref().unwrap().value.as_ref(),
            b"fake-cluster-bytes"
        );
    }

    #[test]
    fn test_decode_unknown_status_value() {
        let response = status::ClientStatusResponse {
            config: vec![status::ClientConfig {
                generic_xds_configs: vec![status::client_config::GenericXdsConfig {
                    config_status: 42,
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let decoded = decode_response(response);
        assert!(decoded.clients[0].node.is_none());
        assert_eq!(decoded.clients[0].xds_configs[0].config_status, "42");
    }

    #[test]
    fn test_value_to_json_nested() {
        let value = protobuf::Value {
            kind: Some(Kind::ListValue(protobuf::ListValue {
                values: vec![
                    string_value("a"),
                    protobuf::Value {
                        kind: Some(Kind::BoolValue(true)),
                    },
                    protobuf::Value { kind: None },
                ],
            })),
        };
        assert_eq!(value_to_json(value), serde_json::json!(["a", true, null]));
    }
}
