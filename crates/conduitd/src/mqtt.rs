//! MQTT transport — one rumqttc client per broker, driven by its own task.
//!
//! The driver maps event-loop events onto the router's handlers. rumqttc
//! reconnects on the next `poll` after an error; the driver only pauses
//! between attempts and re-announces `Connecting`.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    SubAck, SubscribeReasonCode,
};
use tokio::sync::broadcast;

use conduit_core::config::BrokerConfig;
use conduit_services::{BridgeRouter, BrokerLink, LinkError, LinkSide, Qos, TransportLogLevel};

/// Requests buffered between the router and the event loop.
const CHANNEL_CAPACITY: usize = 1024;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// rumqttc rejects keep-alive intervals shorter than this.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Outbound half of an MQTT connection.
pub struct MqttLink {
    client: AsyncClient,
}

impl BrokerLink for MqttLink {
    fn subscribe(&self, pattern: &str, qos: Qos) -> Result<(), LinkError> {
        self.client
            .try_subscribe(pattern, to_mqtt_qos(qos))
            .map_err(|e| LinkError::Rejected(e.to_string()))
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), LinkError> {
        self.client
            .try_publish(topic, to_mqtt_qos(qos), retain, payload.to_vec())
            .map_err(|e| LinkError::Rejected(e.to_string()))
    }
}

/// Build the client for one side. Nothing touches the network until the
/// returned event loop is polled.
pub fn connect(side: LinkSide, config: &BrokerConfig) -> (Arc<MqttLink>, EventLoop) {
    let client_id = if config.client_id.is_empty() {
        format!("conduit-{side}-{}", std::process::id())
    } else {
        config.client_id.clone()
    };

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs).max(MIN_KEEP_ALIVE));
    options.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
    (Arc::new(MqttLink { client }), eventloop)
}

/// Poll `eventloop` until shutdown, feeding the router.
pub async fn drive(
    side: LinkSide,
    mut eventloop: EventLoop,
    router: Arc<BridgeRouter>,
    mut shutdown: broadcast::Receiver<()>,
) {
    router.on_connecting(side);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        router.on_connect(side, return_code(&ack.code));
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // Errors are logged and counted by the router.
                        let _ = router.on_message(side, &publish.topic, &publish.payload);
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        let (level, text) = describe_suback(&ack);
                        router.on_log(side, level, &text);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        router.on_log(side, TransportLogLevel::Notice, "broker closed the session");
                        router.on_disconnect(side, 0);
                    }
                    Ok(Event::Incoming(packet)) => {
                        router.on_log(
                            side,
                            TransportLogLevel::Debug,
                            &format!("received {packet:?}"),
                        );
                    }
                    Ok(Event::Outgoing(outgoing)) => {
                        tracing::trace!(side = %side, ?outgoing, "outgoing");
                    }
                    Err(e) => {
                        router.on_disconnect(side, error_code(&e));
                        router.on_log(side, TransportLogLevel::Error, &e.to_string());
                        tokio::select! {
                            _ = shutdown.recv() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                        router.on_connecting(side);
                    }
                }
            }
        }
    }

    tracing::info!(side = %side, "transport stopped");
}

fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// A refused subscription means this side will never receive traffic.
fn describe_suback(ack: &SubAck) -> (TransportLogLevel, String) {
    let refused = ack
        .return_codes
        .iter()
        .filter(|code| matches!(code, SubscribeReasonCode::Failure))
        .count();
    if refused > 0 {
        (
            TransportLogLevel::Warning,
            format!("broker refused {refused} subscription(s), packet {}", ack.pkid),
        )
    } else {
        (
            TransportLogLevel::Info,
            format!("subscription acknowledged, packet {}", ack.pkid),
        )
    }
}

/// MQTT 3.1.1 CONNACK return codes.
fn return_code(code: &ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Broker refusals keep their return code; any other failure is reported
/// as an unexpected disconnect.
fn error_code(error: &ConnectionError) -> u8 {
    match error {
        ConnectionError::ConnectionRefused(code) => return_code(code),
        _ => 1,
    }
}
