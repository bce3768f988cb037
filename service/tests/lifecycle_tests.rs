//! Startup and shutdown of the full service.
//!
//! Tests that need a real store and broker are `#[ignore]` by default because
//! they start Docker containers; run them with:
//!
//! ```bash
//! cargo test -p zonelog-service --test lifecycle_tests -- --ignored
//! ```

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::{Duration, Instant};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mosquitto::Mosquitto;
use testcontainers_modules::postgres::Postgres;
use zonelog_core::StoreError;
use zonelog_mqtt::{BusError, ConnectionState, MqttConfig, ShutdownOutcome};
use zonelog_postgres::schema::SCHEMA_STATEMENTS;
use zonelog_postgres::{PostgresConfig, PostgresRecordStore};
use zonelog_service::{Application, Config, StartupError};
use zonelog_testing::fixtures::{EXAMPLE_PAYLOAD, MISSING_FIELDS_PAYLOAD};

const TOPIC: &str = "msoft/msrr/zone_change";

fn mqtt_config(port: u16) -> MqttConfig {
    MqttConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .client_id("zonelog-lifecycle-test")
        .topic(TOPIC)
        .reconnect_interval(Duration::from_millis(100))
        .build()
        .unwrap()
}

fn config(postgres: PostgresConfig, mqtt_port: u16, connect_timeout: Duration) -> Config {
    Config {
        mqtt: mqtt_config(mqtt_port),
        postgres,
        bus_connect_timeout: connect_timeout,
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_startup() {
    let postgres = PostgresConfig::new("127.0.0.1", 1, "zonelog", "secret", "zonelog")
        .with_connect_timeout(Duration::from_secs(2));
    let config = config(postgres, 1, Duration::from_millis(200));

    match Application::start(&config).await {
        Err(StartupError::Store(StoreError::Connection(_))) => {}
        Err(other) => panic!("Expected store connection error, got {other}"),
        Ok(_) => panic!("Startup must fail without a store"),
    }
}

/// Start a Postgres container and return it with a provisioned store config.
async fn start_store() -> (ContainerAsync<Postgres>, PostgresConfig) {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start postgres container");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get postgres port");

    let config = PostgresConfig::new("127.0.0.1", port, "postgres", "postgres", "postgres")
        .with_connect_timeout(Duration::from_secs(2));

    for _ in 0..60 {
        if let Ok(store) = PostgresRecordStore::connect(&config).await {
            for statement in SCHEMA_STATEMENTS {
                sqlx::query(statement)
                    .execute(store.pool())
                    .await
                    .expect("Failed to provision schema");
            }
            store.close().await;
            return (container, config);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("Postgres did not accept connections");
}

async fn start_broker() -> (ContainerAsync<Mosquitto>, u16) {
    let container = Mosquitto::default()
        .start()
        .await
        .expect("Failed to start mosquitto container");
    let port = container
        .get_host_port_ipv4(1883)
        .await
        .expect("Failed to get mosquitto port");
    (container, port)
}

async fn publish(port: u16, payloads: &[&str]) {
    let options = MqttOptions::new("zonelog-lifecycle-publisher", "127.0.0.1", port);
    let (client, mut eventloop) = AsyncClient::new(options, 16);

    for payload in payloads {
        client
            .publish(TOPIC, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .unwrap();
    }

    let mut acked = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while acked < payloads.len() {
            if let Ok(Event::Incoming(Packet::PubAck(_))) = eventloop.poll().await {
                acked += 1;
            }
        }
    })
    .await
    .expect("Publisher did not get acks");
}

#[tokio::test]
#[ignore]
async fn test_unreachable_broker_fails_startup_within_window() {
    let (_store_container, postgres) = start_store().await;
    let config = config(postgres, 1, Duration::from_millis(500));

    let started = Instant::now();
    match Application::start(&config).await {
        Err(StartupError::Bus(BusError::InitialConnectTimeout { .. })) => {}
        Err(other) => panic!("Expected bus connect timeout, got {other}"),
        Ok(_) => panic!("Startup must fail without a broker"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
#[ignore]
async fn test_end_to_end_ingestion_and_shutdown() {
    let (_store_container, postgres) = start_store().await;
    let (_broker_container, mqtt_port) = start_broker().await;
    let config = config(postgres.clone(), mqtt_port, Duration::from_secs(10));

    let app = Application::start(&config).await.expect("Startup failed");

    tokio::time::timeout(Duration::from_secs(10), async {
        while app.bus_state() != ConnectionState::Subscribed {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Bus did not subscribe in time");

    publish(
        mqtt_port,
        &[EXAMPLE_PAYLOAD, MISSING_FIELDS_PAYLOAD, EXAMPLE_PAYLOAD],
    )
    .await;

    let reader = PostgresRecordStore::connect(&postgres)
        .await
        .expect("Reader connect failed");
    let rows = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let rows = reader.records_for_subject("u1").await.unwrap();
            if rows.len() >= 2 {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("Rows did not arrive in time");

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.bus_topic, TOPIC);
        assert_eq!(row.zone_previous, 2);
        assert_eq!(row.zone_new, 3);
        assert!((row.measured_value - 142.5).abs() < 1e-9);
    }
    assert!(reader.records_for_subject("u2").await.unwrap().is_empty());
    reader.close().await;

    let bound = config.bus_shutdown_timeout();
    let started = Instant::now();
    let outcome = app.run_until(async {}).await;
    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert!(started.elapsed() <= bound + Duration::from_secs(1));
}
