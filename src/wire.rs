//! Newline-delimited JSON protocol.
//!
//! Each request is one JSON object on one line, tagged by `"op"`:
//!
//! ```text
//! {"op":"hold","resource_id":"SEAT-A1","holder":"alice","ttl_ms":60000}
//! {"ok":true,"result":{"resource_id":"SEAT-A1","token":1}}
//! ```
//!
//! Every request gets exactly one response line, `{"ok":true,"result":..}`
//! or `{"ok":false,"error":{"kind":..,"category":..,"message":..}}`. After
//! `listen`, event lines (`{"event":"hold_placed",..}`) for that resource
//! are interleaved with responses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{
    command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS, CONNECTIONS_ACTIVE,
    CONNECTIONS_REJECTED_TOTAL, CONNECTIONS_TOTAL,
};
use crate::payment::PaymentDetails;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Register {
        resource: Resource,
    },
    Resources,
    Hold {
        resource_id: ResourceId,
        holder: HolderId,
        #[serde(default)]
        ttl_ms: Option<u64>,
    },
    HoldMany {
        resource_ids: Vec<ResourceId>,
        holder: HolderId,
        #[serde(default)]
        ttl_ms: Option<u64>,
    },
    Confirm {
        resource_id: ResourceId,
        holder: HolderId,
        token: HoldToken,
        #[serde(default)]
        payment: Option<PaymentDetails>,
    },
    Release {
        resource_id: ResourceId,
        holder: HolderId,
        token: HoldToken,
    },
    CancelSeat {
        booking_id: BookingId,
    },
    Book {
        resource_id: ResourceId,
        holder: HolderId,
        start: Ms,
        end: Ms,
        #[serde(default)]
        payment: Option<PaymentDetails>,
    },
    CancelRange {
        booking_id: BookingId,
    },
    Complete {
        booking_id: BookingId,
        rating: u8,
        distance_km: f64,
    },
    GetBooking {
        booking_id: BookingId,
    },
    HolderBookings {
        holder: HolderId,
    },
    ResourceBookings {
        resource_id: ResourceId,
    },
    SeatStatus {
        resource_id: ResourceId,
    },
    AvailableSeats,
    Availability {
        resource_id: ResourceId,
        start: Ms,
        end: Ms,
    },
    AverageRating {
        resource_id: ResourceId,
    },
    Listen {
        resource_id: ResourceId,
    },
    Unlisten {
        resource_id: ResourceId,
    },
}

pub fn parse_request(line: &str) -> Result<Request, serde_json::Error> {
    serde_json::from_str(line)
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("framing error: {0}")]
    Codec(#[from] LinesCodecError),
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn ok_response(result: Value) -> Value {
    json!({ "ok": true, "result": result })
}

pub fn error_response(err: &EngineError) -> Value {
    json!({
        "ok": false,
        "error": {
            "kind": err.code(),
            "category": err.category().as_str(),
            "message": err.to_string(),
        }
    })
}

fn bad_request(message: String) -> Value {
    json!({
        "ok": false,
        "error": { "kind": "bad_request", "category": "validation", "message": message }
    })
}

/// Per-connection state: the engine handle plus any `listen` forwarders.
struct Session {
    engine: Arc<Engine>,
    default_hold: Duration,
    events: mpsc::Sender<Event>,
    listeners: HashMap<ResourceId, JoinHandle<()>>,
}

impl Session {
    fn hold_ttl(&self, ttl_ms: Option<u64>) -> Duration {
        ttl_ms.map(Duration::from_millis).unwrap_or(self.default_hold)
    }

    async fn execute(&mut self, req: Request) -> Result<Value, EngineError> {
        let engine = &self.engine;
        let value = match req {
            Request::Register { resource } => {
                let id = resource.id.clone();
                engine.register(resource)?;
                json!({ "resource_id": id })
            }
            Request::Resources => to_value(engine.list_resources()),
            Request::Hold {
                resource_id,
                holder,
                ttl_ms,
            } => {
                let token = engine
                    .hold_seat(&resource_id, &holder, self.hold_ttl(ttl_ms))
                    .await?;
                json!({ "resource_id": resource_id, "token": token })
            }
            Request::HoldMany {
                resource_ids,
                holder,
                ttl_ms,
            } => {
                let placed = engine
                    .hold_seats(&resource_ids, &holder, self.hold_ttl(ttl_ms))
                    .await?;
                let holds: Vec<Value> = placed
                    .into_iter()
                    .map(|(resource_id, token)| json!({ "resource_id": resource_id, "token": token }))
                    .collect();
                Value::Array(holds)
            }
            Request::Confirm {
                resource_id,
                holder,
                token,
                payment,
            } => {
                let booking = match payment {
                    Some(p) => engine.confirm_seat_paid(&resource_id, &holder, token, &p).await?,
                    None => engine.confirm_seat(&resource_id, &holder, token).await?,
                };
                to_value(booking)
            }
            Request::Release {
                resource_id,
                holder,
                token,
            } => {
                let released = engine.release_seat(&resource_id, &holder, token).await?;
                json!({ "released": released })
            }
            Request::CancelSeat { booking_id } => {
                engine.cancel_seat_booking(booking_id).await?;
                json!({ "cancelled": booking_id })
            }
            Request::Book {
                resource_id,
                holder,
                start,
                end,
                payment,
            } => {
                let booking = match payment {
                    Some(p) => {
                        engine
                            .book_time_range_paid(&resource_id, &holder, start, end, &p)
                            .await?
                    }
                    None => engine.book_time_range(&resource_id, &holder, start, end).await?,
                };
                to_value(booking)
            }
            Request::CancelRange { booking_id } => {
                engine.cancel_time_range_booking(booking_id).await?;
                json!({ "cancelled": booking_id })
            }
            Request::Complete {
                booking_id,
                rating,
                distance_km,
            } => to_value(engine.complete_booking(booking_id, rating, distance_km).await?),
            Request::GetBooking { booking_id } => to_value(engine.get_booking(booking_id)?),
            Request::HolderBookings { holder } => to_value(engine.bookings_for_holder(&holder)),
            Request::ResourceBookings { resource_id } => {
                to_value(engine.bookings_for_resource(&resource_id)?)
            }
            Request::SeatStatus { resource_id } => to_value(engine.seat_status(&resource_id).await?),
            Request::AvailableSeats => to_value(engine.available_seats().await),
            Request::Availability {
                resource_id,
                start,
                end,
            } => to_value(engine.availability(&resource_id, start, end).await?),
            Request::AverageRating { resource_id } => {
                json!({ "average_rating": engine.average_rating(&resource_id)? })
            }
            Request::Listen { resource_id } => {
                engine.resource(&resource_id)?;
                if !self.listeners.contains_key(&resource_id) {
                    let rx = engine.notify.subscribe(&resource_id);
                    let handle = tokio::spawn(forward_events(rx, self.events.clone()));
                    self.listeners.insert(resource_id.clone(), handle);
                }
                json!({ "listening": resource_id })
            }
            Request::Unlisten { resource_id } => {
                if let Some(handle) = self.listeners.remove(&resource_id) {
                    handle.abort();
                }
                json!({ "unlistened": resource_id })
            }
        };
        Ok(value)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
    }
}

fn to_value<T: serde::Serialize>(v: T) -> Value {
    // Model types contain only strings, integers, floats and ULIDs
    serde_json::to_value(v).unwrap_or(Value::Null)
}

async fn forward_events(mut rx: broadcast::Receiver<Event>, tx: mpsc::Sender<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("listener lagged, {n} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    default_hold: Duration,
) -> Result<(), WireError> {
    let (read, write) = socket.into_split();
    let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut out = FramedWrite::new(write, LinesCodec::new());

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
    let mut session = Session {
        engine,
        default_hold,
        events: events_tx,
        listeners: HashMap::new(),
    };

    loop {
        tokio::select! {
            line = lines.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        out.send(bad_request("request line too long".into()).to_string()).await?;
                        continue;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match parse_request(&line) {
                    Ok(req) => run_command(&mut session, req).await,
                    Err(e) => {
                        debug!("unparseable request: {e}");
                        bad_request(e.to_string())
                    }
                };
                out.send(response.to_string()).await?;
            }
            Some(event) = events_rx.recv() => {
                out.send(serde_json::to_string(&event)?).await?;
            }
        }
    }

    Ok(())
}

/// Accept-loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOptions {
    pub max_connections: usize,
    /// Hold ttl for requests that carry none.
    pub default_hold: Duration,
    /// How long open connections get to finish after shutdown.
    pub drain_timeout: Duration,
}

/// Accept clients until `shutdown` resolves, then wait up to
/// `drain_timeout` for open connections. Returns how many were still open
/// when the wait ended; those are aborted.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<Engine>,
    opts: ServeOptions,
    shutdown: impl Future<Output = ()>,
) -> usize {
    let permits = Arc::new(Semaphore::new(opts.max_connections));
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                let Ok(permit) = permits.clone().try_acquire_owned() else {
                    warn!("connection limit reached, rejecting {peer}");
                    metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                    continue;
                };

                info!("connection from {peer}");
                metrics::counter!(CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();
                connections.spawn(async move {
                    if let Err(e) = process_connection(socket, engine, opts.default_hold).await {
                        error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
                    drop(permit);
                });
                // Reap finished sessions so the set stays small
                while connections.try_join_next().is_some() {}
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }
    drop(listener);

    info!("draining {} connections", connections.len());
    let drained = tokio::time::timeout(opts.drain_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    let remaining = connections.len();
    match drained {
        Ok(()) => info!("all connections drained"),
        Err(_) => {
            warn!("drain timeout, {remaining} connections still open");
            connections.abort_all();
        }
    }
    remaining
}

async fn run_command(session: &mut Session, req: Request) -> Value {
    let label = command_label(&req);
    let start = Instant::now();
    let result = session.execute(req).await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    match result {
        Ok(value) => ok_response(value),
        Err(e) => {
            debug!("{label} failed: {e}");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hold() {
        let req = parse_request(
            r#"{"op":"hold","resource_id":"SEAT-A1","holder":"alice","ttl_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::Hold {
                resource_id: "SEAT-A1".into(),
                holder: "alice".into(),
                ttl_ms: Some(1500),
            }
        );
    }

    #[test]
    fn parse_optional_fields_default() {
        let req = parse_request(r#"{"op":"hold","resource_id":"S","holder":"a"}"#).unwrap();
        assert!(matches!(req, Request::Hold { ttl_ms: None, .. }));

        let req = parse_request(
            r#"{"op":"book","resource_id":"VEH-7","holder":"c","start":0,"end":10}"#,
        )
        .unwrap();
        assert!(matches!(req, Request::Book { payment: None, .. }));
    }

    #[test]
    fn parse_confirm_with_payment() {
        let req = parse_request(
            r#"{"op":"confirm","resource_id":"S","holder":"a","token":3,
                "payment":{"method":"card","amount":120}}"#,
        )
        .unwrap();
        let Request::Confirm { token, payment, .. } = req else {
            panic!("expected confirm");
        };
        assert_eq!(token, 3);
        assert_eq!(payment.unwrap().amount, 120);
    }

    #[test]
    fn parse_register_and_unit_ops() {
        let req = parse_request(
            r#"{"op":"register","resource":{"id":"VEH-7","kind":"time_ranged","base_rate":5000}}"#,
        )
        .unwrap();
        assert_eq!(req, Request::Register { resource: Resource::vehicle("VEH-7", 5000) });
        assert_eq!(parse_request(r#"{"op":"available_seats"}"#).unwrap(), Request::AvailableSeats);
        assert_eq!(parse_request(r#"{"op":"resources"}"#).unwrap(), Request::Resources);
    }

    #[test]
    fn parse_rejects_unknown_and_malformed() {
        assert!(parse_request(r#"{"op":"teleport"}"#).is_err());
        assert!(parse_request(r#"{"op":"hold","holder":"a"}"#).is_err());
        assert!(parse_request(r#"{"op":"cancel_seat","booking_id":"not-a-ulid"}"#).is_err());
        assert!(parse_request("hold SEAT-A1").is_err());
    }

    #[test]
    fn error_shape() {
        let v = error_response(&EngineError::AlreadyHeld("SEAT-A1".into()));
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["kind"], "already_held");
        assert_eq!(v["error"]["category"], "state_conflict");
        assert_eq!(v["error"]["message"], "SEAT-A1 is already held");
    }

    #[test]
    fn command_labels() {
        assert_eq!(command_label(&Request::AvailableSeats), "available_seats");
        assert_eq!(
            command_label(&Request::Listen { resource_id: "S".into() }),
            "listen"
        );
    }
}
