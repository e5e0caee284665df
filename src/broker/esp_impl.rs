//! ESP-IDF MQTT transport.
//!
//! Compiled only for `target_os = "espidf"`.  Wraps `EspMqttClient`
//! (esp-mqtt over mbedTLS) and translates its event callback into
//! [`LinkEvents`].  The callback runs on the esp-mqtt task, never on the
//! control loop.

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS as EspQoS,
};
use esp_idf_svc::tls::X509;
use log::{error, info, warn};

use super::{
    BrokerClient, BrokerConnector, BrokerError, ConnectionConfig, LinkEvents, QoS, TlsPolicy,
};
use crate::error::ConnectionError;

/// esp-mqtt task stack; TLS handshakes need more than the default.
const MQTT_TASK_STACK: usize = 8192;

fn esp_qos(qos: QoS) -> EspQoS {
    match qos {
        QoS::AtMostOnce => EspQoS::AtMostOnce,
        QoS::AtLeastOnce => EspQoS::AtLeastOnce,
        QoS::ExactlyOnce => EspQoS::ExactlyOnce,
    }
}

/// NUL-terminated copy of the CA PEM with `'static` lifetime.
///
/// esp-mqtt keeps a pointer to the certificate for reconnects, and the
/// connection lives for the rest of the process, so the copy is leaked.
fn leak_ca(ca_pem: &str) -> X509<'static> {
    let mut bytes = ca_pem.as_bytes().to_vec();
    bytes.push(0);
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    X509::pem_until_nul(bytes)
}

/// Opens `mqtts://` sessions through esp-mqtt.
pub struct EspMqttConnector;

impl BrokerConnector for EspMqttConnector {
    type Client = EspBrokerClient;

    fn open(
        &mut self,
        config: &ConnectionConfig,
        client_id: &str,
        events: LinkEvents,
    ) -> Result<EspBrokerClient, ConnectionError> {
        let url = config.broker_url();

        let mut conf = MqttClientConfiguration {
            client_id: Some(client_id),
            keep_alive_interval: Some(core::time::Duration::from_secs(
                config.keep_alive_secs as u64,
            )),
            reconnect_timeout: Some(core::time::Duration::from_millis(
                config.reconnect_timeout_ms as u64,
            )),
            disable_clean_session: !config.clean_session,
            username: config.credentials.as_ref().map(|c| c.username.as_str()),
            password: config.credentials.as_ref().map(|c| c.password.as_str()),
            task_stack: MQTT_TASK_STACK,
            ..Default::default()
        };

        match &config.tls {
            TlsPolicy::AcceptAny => {
                conf.skip_cert_common_name_check = true;
            }
            TlsPolicy::PinnedCa { ca_pem } => {
                conf.server_certificate = Some(leak_ca(ca_pem));
            }
            TlsPolicy::CertificateBundle => {
                conf.crt_bundle_attach = Some(esp_idf_svc::sys::esp_crt_bundle_attach);
            }
        }

        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(session_present) => {
                info!("MQTT(espidf): CONNACK (session_present={})", session_present);
                events.connected();
            }
            EventPayload::Disconnected => events.disconnected(),
            EventPayload::Received {
                topic: Some(topic),
                data,
                details: Details::Complete,
                ..
            } => events.message(topic, data),
            EventPayload::Received { .. } => {
                warn!("MQTT(espidf): chunked or topic-less message dropped");
            }
            EventPayload::Error(e) => error!("MQTT(espidf): {:?}", e),
            _ => {}
        })
        .map_err(|e| {
            error!("MQTT(espidf): client init failed — {:?}", e);
            ConnectionError::Handshake
        })?;

        Ok(EspBrokerClient { client })
    }
}

/// Live esp-mqtt client.
pub struct EspBrokerClient {
    client: EspMqttClient<'static>,
}

impl BrokerClient for EspBrokerClient {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, esp_qos(qos))
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT(espidf): subscribe '{}' failed — {:?}", topic, e);
                BrokerError::Rejected
            })
    }

    fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        // `enqueue` hands the message to the outbox and returns without
        // waiting for the network.
        self.client
            .enqueue(topic, esp_qos(qos), retain, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT(espidf): enqueue '{}' failed — {:?}", topic, e);
                BrokerError::Io
            })
    }
}
