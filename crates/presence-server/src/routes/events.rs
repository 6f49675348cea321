use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use presence_core::notify::Notifier;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::auth::{AdminCaller, Caller};
use crate::state::AppState;

/// Event names for one subscription: `connected` first, then `tick` per
/// publish. Lagged ticks are skipped; a tick only means "re-fetch now".
/// The stream ends once the notifier shuts down, and dropping it drops the
/// receiver, which unsubscribes.
fn ticks(
    rx: broadcast::Receiver<()>,
    tick: &'static str,
) -> impl Stream<Item = &'static str> + Send + 'static {
    let updates = BroadcastStream::new(rx).filter_map(move |msg| msg.ok().map(|()| tick));
    tokio_stream::once("connected").chain(updates)
}

pub fn availability_ticks(notifier: &Notifier) -> impl Stream<Item = &'static str> + Send + 'static {
    ticks(notifier.subscribe_availability(), "update")
}

pub fn ping_ticks(
    notifier: &Notifier,
    user_id: &str,
) -> impl Stream<Item = &'static str> + Send + 'static {
    ticks(notifier.subscribe_pings(user_id), "ping")
}

fn into_sse(
    names: impl Stream<Item = &'static str> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let stream = names.map(|name| Ok::<Event, Infallible>(Event::default().event(name).data(name)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/admin/availability/stream: SSE stream that emits `update`
/// whenever any employee's availability changes.
pub async fn admin_availability_stream(
    State(app): State<AppState>,
    AdminCaller(admin): AdminCaller,
) -> impl axum::response::IntoResponse {
    tracing::debug!(admin = %admin.id, "availability stream opened");
    into_sse(availability_ticks(app.tracker.notifier()))
}

/// GET /api/app/pings/stream: SSE stream that emits `ping` whenever the
/// caller is pinged.
pub async fn ping_stream(
    State(app): State<AppState>,
    Caller(user): Caller,
) -> impl axum::response::IntoResponse {
    tracing::debug!(user = %user.id, "ping stream opened");
    into_sse(ping_ticks(app.tracker.notifier(), &user.id))
}
