//! Per-connection frame handling and socket loop.
//!
//! Each inbound frame is handled to completion without suspending, so
//! frames from one connection are applied strictly in arrival order.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use safetrail_core::{AlertId, AlertKind, AlertPayload, LocationReport, NewAlert, Role};
use safetrail_geofence::crossings;
use tracing::{debug, info, instrument, warn};

use super::protocol::{ClientFrame, PanicDetails, ServerFrame};
use super::session::SessionHandle;
use crate::hub::Hub;
use crate::metrics::WS_FRAMES_REJECTED_TOTAL;

/// How long to wait for queued frames to flush after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol state machine for one session.
pub struct SessionSupervisor {
    hub: Arc<Hub>,
    session: Arc<SessionHandle>,
}

impl SessionSupervisor {
    /// Supervisor for an already registered `session`.
    pub fn new(hub: Arc<Hub>, session: Arc<SessionHandle>) -> Self {
        Self { hub, session }
    }

    /// The supervised session.
    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    /// Decode and handle one text frame.
    pub fn handle_text(&self, text: &str) {
        self.session.mark_seen();
        match ClientFrame::decode(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => {
                metrics::counter!(WS_FRAMES_REJECTED_TOTAL).increment(1);
                warn!(session_id = %self.session.id, error = %e, "rejected malformed frame");
                self.reply(&ServerFrame::error("Invalid message format"));
            }
        }
    }

    /// Handle one decoded frame.
    pub fn handle_frame(&self, frame: ClientFrame) {
        match frame {
            ClientFrame::LocationUpdate { data } => self.on_location(data),
            ClientFrame::Ping {} => self.reply(&ServerFrame::pong()),
            ClientFrame::PanicAlert { location, data } => self.on_panic(location, data),
            ClientFrame::IdentifyUser { user_type } => self.on_identify(user_type),
            ClientFrame::EmergencyAcknowledged { alert_id } => self.on_acknowledge(&alert_id),
            ClientFrame::Unknown { frame_type } => {
                debug!(session_id = %self.session.id, frame_type, "ignoring unknown frame type");
            }
        }
    }

    fn on_location(&self, report: LocationReport) {
        let location = match report.stamp(Utc::now()) {
            Ok(location) => location,
            Err(e) => {
                metrics::counter!(WS_FRAMES_REJECTED_TOTAL).increment(1);
                self.reply(&ServerFrame::error(format!("Invalid location: {e}")));
                return;
            }
        };
        self.session.set_location(location);

        let evaluation = self.hub.geofence.evaluate(location.coordinates());
        let previous = self.session.swap_zone(evaluation.zone.clone());
        for crossing in crossings(previous.as_ref(), evaluation.zone.as_ref()) {
            info!(
                session_id = %self.session.id,
                zone = %crossing.zone.name,
                direction = crossing.direction.as_str(),
                "geofence crossing"
            );
            let payload = AlertPayload {
                emergency_type: Some(crossing.emergency_type()),
                message: Some(crossing.message()),
                ..AlertPayload::default()
            };
            let _ = self.hub.alerts.create(
                NewAlert::new(AlertKind::Geofence, self.session.id.clone())
                    .at(Some(location))
                    .in_zone(crossing.zone.name.clone())
                    .with_payload(payload),
            );
        }

        let _ = self.hub.router.to_all(
            &ServerFrame::location_update(self.session.id.clone(), location),
            Some(&self.session.id),
        );
    }

    fn on_panic(&self, location: Option<LocationReport>, details: Option<PanicDetails>) {
        let now = Utc::now();
        let location = match location.map(|report| report.stamp(now)) {
            Some(Ok(location)) => Some(location),
            Some(Err(e)) => {
                debug!(session_id = %self.session.id, error = %e, "panic location invalid, using last known");
                self.session.location()
            }
            None => self.session.location(),
        };
        let details = details.unwrap_or_default();
        let payload = AlertPayload {
            emergency_type: details.emergency_type,
            message: details.message,
            ..AlertPayload::default()
        };
        let alert = self.hub.alerts.create(
            NewAlert::new(AlertKind::Panic, self.session.id.clone())
                .at(location)
                .with_payload(payload),
        );
        self.reply(&ServerFrame::panic_acknowledged(alert.id));
    }

    fn on_identify(&self, role: Role) {
        let router = &self.hub.router;
        let previous = if role.is_authority() {
            // Holding the store's publish order means no alert is both in the
            // catch-up and in a later creation broadcast.
            self.hub.alerts.with_active(|active| {
                debug!(session_id = %self.session.id, count = active.len(), "sending active alerts");
                let frames: Vec<_> = active.into_iter().map(ServerFrame::emergency_alert).collect();
                router.assign_role(&self.session, role, &frames)
            })
        } else {
            router.assign_role(&self.session, role, &[])
        };
        info!(session_id = %self.session.id, %role, %previous, "session identified");
    }

    fn on_acknowledge(&self, alert_id: &AlertId) {
        if !self.hub.acknowledge_policy().may_acknowledge(&self.session) {
            warn!(session_id = %self.session.id, alert_id = %alert_id, "acknowledge refused");
            self.reply(&ServerFrame::error("Only authorities can acknowledge emergencies"));
            return;
        }
        if let Err(e) = self.hub.alerts.acknowledge(alert_id, self.session.id.as_str()) {
            debug!(session_id = %self.session.id, error = %e, "acknowledge failed");
            self.reply(&ServerFrame::error("Emergency alert not found"));
        }
    }

    fn reply(&self, frame: &ServerFrame) {
        let _ = self.hub.router.to_session(&self.session.id, frame);
    }

    /// Drive a connected socket until either side closes, then disconnect.
    #[instrument(skip_all, fields(session_id))]
    pub async fn run(hub: Arc<Hub>, socket: WebSocket, ping_interval: Duration) {
        let (session, mut outbound) = hub.connect();
        let _ = tracing::Span::current().record("session_id", session.id.as_str());
        let supervisor = Self::new(Arc::clone(&hub), Arc::clone(&session));
        let cancel = session.cancel_token();
        let (mut ws_tx, mut ws_rx) = socket.split();

        let writer_session = Arc::clone(&session);
        let writer_cancel = cancel.clone();
        let writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval(ping_interval);
            let _ = ping.tick().await;
            loop {
                tokio::select! {
                    msg = outbound.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text((*text).clone().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    () = writer_cancel.cancelled() => {
                        while let Ok(text) = outbound.try_recv() {
                            if ws_tx.send(Message::Text((*text).clone().into())).await.is_err() {
                                break;
                            }
                        }
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            writer_session.close();
        });

        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => break session.close_reason().unwrap_or("closed_by_server"),
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => supervisor.handle_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => supervisor.handle_text(text),
                        Err(_) => {
                            metrics::counter!(WS_FRAMES_REJECTED_TOTAL).increment(1);
                            supervisor.reply(&ServerFrame::error("Invalid message format"));
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => session.mark_seen(),
                    Some(Ok(Message::Close(_))) | None => break "client_closed",
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break "transport_error";
                    }
                },
            }
        };

        session.close();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            warn!("writer did not finish in time");
        }
        let _ = hub.disconnect(&session.id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrail_core::AlertStatus;

    use crate::hub::test_support::{frames, hub, types};

    fn supervisor(hub: &Arc<Hub>) -> (SessionSupervisor, tokio::sync::mpsc::Receiver<Arc<String>>) {
        let (session, mut rx) = hub.connect();
        let _ = types(&mut rx);
        (SessionSupervisor::new(Arc::clone(hub), session), rx)
    }

    #[test]
    fn ping_replies_pong() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);
        sup.handle_text(r#"{"type":"ping"}"#);
        assert_eq!(types(&mut rx), ["pong"]);
    }

    #[test]
    fn location_update_goes_to_others_only() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);
        let (_other, mut other_rx) = supervisor(&hub);
        let _ = types(&mut rx);

        sup.handle_text(r#"{"type":"location_update","data":{"lat":0.0,"lng":0.0}}"#);
        assert!(types(&mut rx).is_empty());
        let got = frames(&mut other_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "location_update");
        assert_eq!(got[0]["sessionId"], sup.session().id.as_str());
        assert!(sup.session().location().is_some());
    }

    #[test]
    fn invalid_coordinates_rejected() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);
        let (_other, mut other_rx) = supervisor(&hub);
        let _ = types(&mut rx);

        sup.handle_text(r#"{"type":"location_update","data":{"lat":123.0,"lng":0.0}}"#);
        assert_eq!(types(&mut rx), ["error"]);
        assert!(types(&mut other_rx).is_empty());
        assert!(sup.session().location().is_none());
    }

    #[test]
    fn leaving_safe_zone_raises_geofence_alert() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);

        sup.handle_text(r#"{"type":"location_update","data":{"lat":0.0,"lng":0.0}}"#);
        assert!(hub.alerts.is_empty());
        sup.handle_text(r#"{"type":"location_update","data":{"lat":1.0,"lng":1.0}}"#);

        let alerts = hub.alerts.list_active();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Geofence);
        assert_eq!(alerts[0].zone.as_deref(), Some("Safe Zone 1"));
        assert_eq!(alerts[0].payload.emergency_type.as_deref(), Some("geofence_exit"));

        // Own emergency_alert broadcast; location_update excludes sender.
        assert_eq!(types(&mut rx), ["emergency_alert"]);

        // Still outside: no new alert.
        sup.handle_text(r#"{"type":"location_update","data":{"lat":1.1,"lng":1.0}}"#);
        assert_eq!(hub.alerts.len(), 1);
    }

    #[test]
    fn panic_without_location_uses_last_known() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);

        sup.handle_text(r#"{"type":"location_update","data":{"lat":10.0,"lng":20.0}}"#);
        sup.handle_text(r#"{"type":"panic_alert"}"#);

        let alerts = hub.alerts.list_active();
        assert_eq!(alerts.len(), 1);
        let location = alerts[0].location.unwrap();
        assert!((location.lat - 10.0).abs() < f64::EPSILON);
        assert!((location.lng - 20.0).abs() < f64::EPSILON);

        let got = frames(&mut rx);
        let kinds: Vec<_> = got.iter().map(|f| f["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["emergency_alert", "panic_acknowledged"]);
        assert_eq!(got[1]["alertId"], alerts[0].id.as_str());
    }

    #[test]
    fn panic_keeps_supplied_details() {
        let hub = Arc::new(hub());
        let (sup, _rx) = supervisor(&hub);
        sup.handle_text(
            r#"{"type":"panic_alert","location":{"lat":1.0,"lng":2.0},"data":{"emergencyType":"medical","message":"fell"}}"#,
        );
        let alert = &hub.alerts.list_active()[0];
        assert_eq!(alert.payload.emergency_type.as_deref(), Some("medical"));
        assert_eq!(alert.payload.message.as_deref(), Some("fell"));
        assert_eq!(alert.payload.source.as_deref(), Some("websocket"));
    }

    #[test]
    fn authority_receives_active_alerts_on_identify() {
        let hub = Arc::new(hub());
        let (tourist, _trx) = supervisor(&hub);
        for _ in 0..3 {
            tourist.handle_text(r#"{"type":"panic_alert"}"#);
        }
        let resolved = hub.alerts.create(NewAlert::new(AlertKind::Panic, tourist.session().id.clone()));
        let _ = hub.alerts.resolve(&resolved.id, "officer").unwrap();

        let (police, mut prx) = supervisor(&hub);
        police.handle_text(r#"{"type":"identify_user","userType":"authority"}"#);
        assert_eq!(types(&mut prx), ["emergency_alert"; 3]);

        tourist.handle_text(r#"{"type":"panic_alert"}"#);
        assert_eq!(types(&mut prx), ["emergency_alert"]);
    }

    #[test]
    fn identify_catch_up_is_not_interleaved() {
        let hub = Arc::new(hub());
        let (tourist, _trx) = supervisor(&hub);
        for _ in 0..3 {
            tourist.handle_text(r#"{"type":"panic_alert"}"#);
        }
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let noise = {
            let hub = Arc::clone(&hub);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let _ = hub.router.to_all(&ServerFrame::health_check(0, 0), None);
                    std::thread::yield_now();
                }
            })
        };

        for _ in 0..20 {
            let (police, mut prx) = supervisor(&hub);
            police.handle_text(r#"{"type":"identify_user","userType":"authority"}"#);
            let got: Vec<_> = types(&mut prx)
                .into_iter()
                .skip_while(|t| t == "health_check")
                .take(3)
                .collect();
            assert_eq!(got, ["emergency_alert"; 3]);
            let _ = hub.disconnect(&police.session().id, "test");
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        noise.join().unwrap();
    }

    #[test]
    fn alert_raised_during_identify_arrives_once() {
        let hub = Arc::new(hub());
        let (tourist, _trx) = supervisor(&hub);
        let (police, mut prx) = supervisor(&hub);

        let raiser = {
            let hub = Arc::clone(&hub);
            let id = tourist.session().id.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let _ = hub.alerts.create(NewAlert::new(AlertKind::HttpSubmitted, id.clone()));
                }
            })
        };
        police.handle_text(r#"{"type":"identify_user","userType":"authority"}"#);
        raiser.join().unwrap();

        let mut ids: Vec<String> = frames(&mut prx)
            .iter()
            .filter(|f| f["type"] == "emergency_alert")
            .map(|f| f["alert"]["id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(ids.len(), 20);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn police_alias_is_authority() {
        let hub = Arc::new(hub());
        let (sup, _rx) = supervisor(&hub);
        sup.handle_text(r#"{"type":"identify_user","userType":"police"}"#);
        assert_eq!(sup.session().role(), Role::Authority);
    }

    #[test]
    fn acknowledge_flow() {
        let hub = Arc::new(hub());
        let (tourist, mut trx) = supervisor(&hub);
        let (police, mut prx) = supervisor(&hub);
        police.handle_text(r#"{"type":"identify_user","userType":"authority"}"#);

        tourist.handle_text(r#"{"type":"panic_alert"}"#);
        let alert_id = hub.alerts.list_active()[0].id.clone();
        let _ = types(&mut trx);
        let _ = types(&mut prx);

        police.handle_text(&format!(r#"{{"type":"emergency_acknowledged","alertId":"{alert_id}"}}"#));

        let got = frames(&mut trx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "emergency_acknowledged_by_authority");
        assert_eq!(got[0]["alertId"], alert_id.as_str());

        let got = frames(&mut prx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "emergency_status_update");
        assert_eq!(got[0]["alert"]["status"], "acknowledged");
        assert_eq!(hub.alerts.get(&alert_id).unwrap().status, AlertStatus::Acknowledged);
    }

    #[test]
    fn tourist_cannot_acknowledge() {
        let hub = Arc::new(hub());
        let (tourist, mut trx) = supervisor(&hub);
        tourist.handle_text(r#"{"type":"panic_alert"}"#);
        let alert_id = hub.alerts.list_active()[0].id.clone();
        let _ = types(&mut trx);

        tourist.handle_text(&format!(r#"{{"type":"emergency_acknowledged","alertId":"{alert_id}"}}"#));
        assert_eq!(types(&mut trx), ["error"]);
        assert_eq!(hub.alerts.get(&alert_id).unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn acknowledge_unknown_alert_errors() {
        let hub = Arc::new(hub());
        let (police, mut prx) = supervisor(&hub);
        police.handle_text(r#"{"type":"identify_user","userType":"authority"}"#);
        police.handle_text(r#"{"type":"emergency_acknowledged","alertId":"alert_missing"}"#);
        let got = frames(&mut prx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["message"], "Emergency alert not found");
    }

    #[test]
    fn malformed_frame_gets_error_and_session_survives() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);
        sup.handle_text("not json");
        sup.handle_text(r#"{"type":"identify_user"}"#);
        let got = frames(&mut rx);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|f| f["message"] == "Invalid message format"));

        sup.handle_text(r#"{"type":"ping"}"#);
        assert_eq!(types(&mut rx), ["pong"]);
    }

    #[test]
    fn unknown_frame_is_ignored() {
        let hub = Arc::new(hub());
        let (sup, mut rx) = supervisor(&hub);
        sup.handle_text(r#"{"type":"dance","moves":3}"#);
        assert!(types(&mut rx).is_empty());
        assert!(sup.session().is_open());
    }
}
