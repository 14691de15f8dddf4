use labeler_core::{Label, LabelerError, RemoteGateway};
use labeler_integration::{HttpGateway, HttpGatewayConfig};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpGateway {
    HttpGateway::new(HttpGatewayConfig {
        base_url: server.uri(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_session_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fetch-csv"))
        .and(query_param("username", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patients": [
                {"patientName": "patient_2", "dicoms": [
                    {"dicomName": "a.dcm", "label": 0, "frameCount": 12},
                    {"dicomName": "b.dcm", "label": 5}
                ]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = gateway(&server).fetch_session_snapshot("alice").await.unwrap();
    assert_eq!(snapshot.patients.len(), 1);
    assert_eq!(snapshot.patients[0].dicoms[0].frame_count, 12);
    assert_eq!(snapshot.patients[0].dicoms[1].label, Label::new(5).unwrap());
}

#[tokio::test]
async fn test_fetch_study_data_not_found_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fetch-patient-dicoms"))
        .and(body_json(json!({"patientName": "patient_9", "username": "alice"})))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"detail": "No DICOMs found for patient: patient_9"})),
        )
        .mount(&server)
        .await;

    let err = gateway(&server)
        .fetch_study_data("patient_9", "alice")
        .await
        .unwrap_err();

    match err {
        LabelerError::GatewayStatus { status, detail } => {
            assert_eq!(status, 404);
            assert_eq!(detail, "No DICOMs found for patient: patient_9");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_study_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fetch-patient-dicoms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patientName": "patient_1",
            "dicoms": [
                {"dicomName": "a.dcm", "label": 0, "images": [
                    {"id": "a.dcm-1", "src": "data:image/png;base64,AAAA"}
                ]},
                {"dicomName": "b.dcm", "label": 0, "images": [], "error": "bad pixel data"}
            ]
        })))
        .mount(&server)
        .await;

    let data = gateway(&server)
        .fetch_study_data("patient_1", "alice")
        .await
        .unwrap();
    assert_eq!(data.patient_name, "patient_1");
    assert_eq!(data.dicoms[0].images.len(), 1);
    assert!(data.dicoms[1].error.is_some());
}

#[tokio::test]
async fn test_commit_label() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update-csv"))
        .and(body_json(json!({
            "patientName": "patient_1",
            "dicomName": "a.dcm",
            "label": 3,
            "username": "alice"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .commit_label("patient_1", "a.dcm", Label::new(3).unwrap(), "alice")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_commit_label_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update-csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&server)
        .await;

    let result = gateway(&server)
        .commit_label("patient_1", "missing.dcm", Label::new(1).unwrap(), "alice")
        .await;
    assert!(matches!(result, Err(LabelerError::Gateway(_))));
}

#[tokio::test]
async fn test_commit_label_plain_text_ok_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update-csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server)
        .commit_label("patient_1", "a.dcm", Label::new(2).unwrap(), "alice")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_all_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reset-csv"))
        .and(query_param("username", "alice"))
        .and(query_param("delete_all", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server).delete_all_data("alice").await.unwrap();
}

#[tokio::test]
async fn test_server_error_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reset-csv"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = gateway(&server).delete_all_data("alice").await.unwrap_err();
    assert!(err.is_remote());
    assert!(matches!(
        err,
        LabelerError::GatewayStatus { status: 500, ref detail } if detail == "Internal Server Error"
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let gateway = HttpGateway::new(HttpGatewayConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();

    let err = gateway.fetch_session_snapshot("alice").await.unwrap_err();
    assert!(matches!(err, LabelerError::Gateway(_)));
}
