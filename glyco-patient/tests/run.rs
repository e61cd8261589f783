use std::{sync::Arc, time::Duration};

use approx::assert_relative_eq;
use glyco_components::solver::ode::Method;
use glyco_patient::{
    GatewayError, LoopbackGateway, Phase, ProfileDocument, SimError, SimulationController, Topics,
    messages::{CgmReading, Telemetry},
};
use serde_json::{Value, json};

fn profile(diabetic: bool, params: Value, simu_length: u32) -> Value {
    json!({
        "diabetic": diabetic,
        "meals": [],
        "bolus_insulins": [],
        "bergman_param": params,
        "sim_settings": {
            "disp_interval": 1,
            "simu_interval": 5,
            "simu_length": simu_length,
            "init_state": {"G0": 120, "X0": 0, "I0": 15}
        }
    })
}

fn start(
    raw: &Value,
) -> (
    Arc<LoopbackGateway>,
    Topics,
    tokio::task::JoinHandle<Result<glyco_patient::RunReport, SimError>>,
) {
    start_document(&ProfileDocument::from_value(raw.clone()).unwrap())
}

fn start_document(
    document: &ProfileDocument,
) -> (
    Arc<LoopbackGateway>,
    Topics,
    tokio::task::JoinHandle<Result<glyco_patient::RunReport, SimError>>,
) {
    let gateway = Arc::new(LoopbackGateway::new());
    let topics = Topics::for_team("it");
    let controller = SimulationController::new(
        Arc::clone(&gateway),
        document,
        topics.clone(),
        Method::default(),
    )
    .unwrap();
    let run = tokio::spawn(controller.run(std::future::pending()));
    (gateway, topics, run)
}

#[tokio::test(start_paused = true)]
async fn profile_request_gets_exactly_one_response() {
    let raw = profile(true, json!({"Gb": "85"}), 4);
    let (gateway, topics, run) = start(&raw);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let request = format!("{}/request/foo", topics.attributes);
    assert_eq!(gateway.inject(&request, "{}"), 1);

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.phase, Phase::Completed);

    let responses = gateway.published_to(&format!("{}/response/foo", topics.attributes));
    assert_eq!(responses.len(), 1);

    let body: Value = serde_json::from_slice(&responses[0].payload).unwrap();
    assert_eq!(body, json!({ "PatientProfile": raw }));

    let announcement: Value =
        serde_json::from_slice(&gateway.published_to(&topics.attributes)[0].payload).unwrap();
    assert_eq!(announcement, body);
}

#[tokio::test(start_paused = true)]
async fn profile_echo_is_byte_for_byte() {
    let text = concat!(
        r#"{"sim_settings":{"simu_length":2,"simu_interval":5,"disp_interval":1,"#,
        r#""init_state":{"I0":15,"X0":0,"G0":120}},"meals":[],"diabetic":true,"#,
        r#""bolus_insulins":[],"bergman_param":{"p2":0.0250}}"#,
    );
    let document = ProfileDocument::from_json_str(text).unwrap();
    let (gateway, topics, run) = start_document(&document);

    tokio::time::sleep(Duration::from_millis(500)).await;
    gateway.inject(&format!("{}/request/7", topics.attributes), "");
    run.await.unwrap().unwrap();

    let expected = format!(r#"{{"PatientProfile":{text}}}"#);
    let responses = gateway.published_to(&format!("{}/response/7", topics.attributes));
    assert_eq!(responses.len(), 1);
    assert_eq!(String::from_utf8_lossy(&responses[0].payload), expected);
    assert_eq!(
        String::from_utf8_lossy(&gateway.published_to(&topics.attributes)[0].payload),
        expected
    );
}

#[tokio::test(start_paused = true)]
async fn malformed_insulin_command_aborts_the_run() {
    let (gateway, topics, run) = start(&profile(true, json!({}), 100));

    tokio::time::sleep(Duration::from_millis(500)).await;
    gateway.inject(&topics.insulin, "not json");

    let error = run.await.unwrap().unwrap_err();
    assert!(matches!(error, SimError::Gateway(GatewayError::Handler { .. })));
    assert_eq!(gateway.disconnects(), 1);
    assert!(gateway.published_to(&topics.cgm).is_empty());
}

#[tokio::test(start_paused = true)]
async fn negative_insulin_rate_aborts_the_run() {
    let (gateway, topics, run) = start(&profile(true, json!({}), 100));

    tokio::time::sleep(Duration::from_millis(500)).await;
    gateway.inject(&topics.insulin, r#"{"insulin_rate": -1}"#);

    assert!(run.await.unwrap().is_err());
    assert_eq!(gateway.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn basal_commands_raise_plasma_insulin() {
    let raw = profile(true, json!({"Ib": 15}), 4);
    let (gateway, topics, run) = start(&raw);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    gateway.inject(&topics.insulin, r#"{"insulin_rate": "0.05"}"#);

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.phase, Phase::Completed);

    let insulin: Vec<f64> = gateway
        .published_to(&topics.telemetry)
        .iter()
        .map(|outbound| {
            serde_json::from_slice::<Telemetry>(&outbound.payload)
                .unwrap()
                .insulin
        })
        .collect();

    assert_eq!(insulin.len(), 3);
    assert_relative_eq!(insulin[0], 15.0, max_relative = 1e-9);
    assert!(insulin[1] > 15.0);
    assert!(insulin[2] > insulin[1]);
}

#[tokio::test(start_paused = true)]
async fn glucose_decays_toward_basal_without_secretion() {
    let raw = profile(false, json!({"gamma": 0, "Ib": 15}), 13);
    let (gateway, topics, run) = start(&raw);

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.steps, 12);
    assert_eq!(report.integrations, 12);

    let p1 = 0.030_82;
    let gb = 92.0;
    for outbound in gateway.published_to(&topics.cgm) {
        let reading: CgmReading = serde_json::from_slice(&outbound.payload).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let t = reading.time as f64;
        assert_relative_eq!(
            reading.glucose - gb,
            (120.0 - gb) * (-p1 * t).exp(),
            max_relative = 1e-4
        );
    }
}
