//! Integration tests for the JSON wire formats
//!
//! The documents in this file are the contract with existing clients and
//! servers: every test decodes or encodes a literal document the way a peer
//! would produce it, so a field rename or tag change shows up as a failure
//! here even if both ends of this codebase were changed in lockstep.

use protocol::{
    ClientRequest, ClientResponse, SearchQuery, ServerRequest, ServerResponse, UsbDevice,
};

fn sample_device() -> UsbDevice {
    UsbDevice {
        busid: "1-1.3".to_string(),
        vendor_id: "0403".to_string(),
        product_id: "6001".to_string(),
        serial: "A5002Lkx".to_string(),
        description: "FTDI FT232R USB UART".to_string(),
    }
}

mod server_protocol {
    use super::*;

    #[test]
    fn test_list_exchange() {
        let request = serde_json::to_string(&ServerRequest::List).unwrap();
        assert_eq!(request, r#"{"command":"list"}"#);

        let response: ServerResponse = serde_json::from_str(
            r#"{
                "status": "success",
                "data": [
                    {
                        "busid": "1-1.3",
                        "vendor_id": "0403",
                        "product_id": "6001",
                        "serial": "A5002Lkx",
                        "description": "FTDI FT232R USB UART"
                    }
                ]
            }"#,
        )
        .unwrap();

        match response {
            ServerResponse::Success { data } => {
                assert_eq!(data, vec![sample_device()]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_bind_exchange() {
        let request = serde_json::to_string(&ServerRequest::Bind {
            busid: "1-1.3".to_string(),
        })
        .unwrap();
        assert_eq!(request, r#"{"command":"bind","busid":"1-1.3"}"#);

        // A bind acknowledgment carries no device data
        let response: ServerResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(response, ServerResponse::Success { data: Vec::new() });
    }

    #[test]
    fn test_error_response() {
        let response: ServerResponse = serde_json::from_str(
            r#"{"status":"error","message":"usbip bind -b 1-9 failed: device not found"}"#,
        )
        .unwrap();
        match response {
            ServerResponse::Error { message } => assert!(message.contains("1-9")),
            other => panic!("unexpected response: {:?}", other),
        }
    }
}

mod client_service_protocol {
    use super::*;

    #[test]
    fn test_attach_request_with_full_query() {
        let request: ClientRequest = serde_json::from_str(
            r#"{
                "command": "attach",
                "id": "0403:6001",
                "bus": "1-1.3",
                "serial": "A5002Lkx",
                "desc": "UART",
                "first": true,
                "host": "192.168.1.10"
            }"#,
        )
        .unwrap();

        let query = request.query();
        assert!(query.matches(&sample_device()));
        assert!(query.first);
        assert_eq!(request.host(), Some("192.168.1.10"));
    }

    #[test]
    fn test_detach_request_minimal() {
        // A bare detach is legal and resolves with an all-wildcard query
        let request: ClientRequest = serde_json::from_str(r#"{"command":"detach"}"#).unwrap();
        assert!(request.query().is_empty());
        assert!(request.query().matches(&sample_device()));
    }

    #[test]
    fn test_query_flattens_into_the_request_document() {
        let request = ClientRequest::Attach {
            query: SearchQuery {
                id: Some("0403:6001".to_string()),
                first: true,
                ..Default::default()
            },
            host: None,
        };
        let json = serde_json::to_string(&request).unwrap();

        // Query fields sit at the top level, not nested under "query"
        assert!(json.contains(r#""id":"0403:6001""#));
        assert!(!json.contains(r#""query""#));
        // Unset fields are omitted entirely
        assert!(!json.contains(r#""serial""#));
    }

    #[test]
    fn test_success_response_document() {
        let response = ClientResponse::Success {
            data: sample_device(),
            server: "192.168.1.10".to_string(),
            local_devices: vec!["/dev/ttyUSB0".to_string()],
        };
        let json = serde_json::to_string(&response).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["server"], "192.168.1.10");
        assert_eq!(parsed["data"]["busid"], "1-1.3");
        assert_eq!(parsed["local_devices"][0], "/dev/ttyUSB0");
    }

    #[test]
    fn test_resolution_failure_statuses_are_distinct() {
        let not_found: ClientResponse =
            serde_json::from_str(r#"{"status":"not_found","message":"scanned 3 server(s)"}"#)
                .unwrap();
        assert!(matches!(not_found, ClientResponse::NotFound { .. }));

        let ambiguous: ClientResponse = serde_json::from_str(
            r#"{"status":"multiple_matches","message":"hub on h1, hub on h2"}"#,
        )
        .unwrap();
        assert!(matches!(ambiguous, ClientResponse::MultipleMatches { .. }));
    }
}
