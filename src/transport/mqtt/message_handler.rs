//! Pure routing of `rumqttc` events for the event-loop task

use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// What the event-loop task should do with one event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Broker answered the CONNECT with a refusal code
    ConnectionRefused(String),
    /// Our QoS 1 publish went out with this packet id
    PublishSent { pkid: u16 },
    /// QoS 1 publish acknowledged
    PublishAcknowledged { pkid: u16 },
    /// Broker closed the session
    Disconnected,
    /// Our own DISCONNECT went out; the loop can stop
    DisconnectSent,
    /// Keepalive traffic and other packets the bridge does not act on
    Infrastructure(String),
    /// Other outgoing packets
    Outgoing,
}

/// Route an event loop event to a decision
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(packet) => match packet {
            Packet::ConnAck(connack) if connack.code == ConnectReturnCode::Success => {
                EventRoute::ConnectionAcknowledged
            }
            Packet::ConnAck(connack) => EventRoute::ConnectionRefused(format!("{:?}", connack.code)),
            Packet::PubAck(puback) => EventRoute::PublishAcknowledged { pkid: puback.pkid },
            Packet::Disconnect => EventRoute::Disconnected,
            other => EventRoute::Infrastructure(format!("{other:?}")),
        },
        Event::Outgoing(Outgoing::Publish(pkid)) => EventRoute::PublishSent { pkid: *pkid },
        Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
        Event::Outgoing(_) => EventRoute::Outgoing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, PubAck};

    #[test]
    fn test_connack_routes() {
        let accepted = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(
            route_mqtt_event(&accepted),
            EventRoute::ConnectionAcknowledged
        );

        let refused = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert!(matches!(
            route_mqtt_event(&refused),
            EventRoute::ConnectionRefused(reason) if reason.contains("NotAuthorized")
        ));
    }

    #[test]
    fn test_puback_carries_packet_id() {
        let event = Event::Incoming(Packet::PubAck(PubAck::new(7)));
        assert_eq!(
            route_mqtt_event(&event),
            EventRoute::PublishAcknowledged { pkid: 7 }
        );
    }

    #[test]
    fn test_outgoing_publish_carries_packet_id() {
        assert_eq!(
            route_mqtt_event(&Event::Outgoing(Outgoing::Publish(3))),
            EventRoute::PublishSent { pkid: 3 }
        );
    }

    #[test]
    fn test_disconnects() {
        assert_eq!(
            route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        );
        assert_eq!(
            route_mqtt_event(&Event::Outgoing(Outgoing::Disconnect)),
            EventRoute::DisconnectSent
        );
    }

    #[test]
    fn test_infrastructure_and_outgoing() {
        assert!(matches!(
            route_mqtt_event(&Event::Incoming(Packet::PingResp)),
            EventRoute::Infrastructure(_)
        ));
        assert_eq!(
            route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::Outgoing
        );
        assert_eq!(
            route_mqtt_event(&Event::Outgoing(Outgoing::PubAck(1))),
            EventRoute::Outgoing
        );
    }
}
