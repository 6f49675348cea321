//! Persistent presence storage using redb.
//!
//! # Table design
//!
//! ```text
//! users     &str  user_id                                   -> JSON User
//! sessions  &str  "{user_id}/{YYYY-MM-DD}"                  -> JSON AvailabilitySession
//! windows   [u8]  session_id(16) ++ starts_ms(8 BE) ++ id(16) -> JSON AvailabilityWindow
//! events    [u8]  user_id ++ 0x00 ++ created_ms(8 BE) ++ id(16) -> JSON AvailabilityEvent
//! pings     [u8]  ping_id(16)                               -> JSON Ping
//! ```
//!
//! The session key is the (user, local date) uniqueness constraint: a second
//! create for the same day finds the existing row inside the same write
//! transaction. redb serializes writers and gives readers a consistent
//! snapshot, so a session is never visible without its initial window.
//!
//! Big-endian timestamps in the window and event keys make a prefix scan
//! return rows in time order.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use redb::{Database, ReadOnlyTable, ReadableTable, Table, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{store_err, Result};
use crate::types::{
    AvailabilityEvent, AvailabilitySession, AvailabilityWindow, EventKind, Ping, SessionSnapshot,
    User,
};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const WINDOWS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("windows");
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");
const PINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pings");

type StrKey = &'static str;
type BytesKey = &'static [u8];
type Bytes = &'static [u8];

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn session_key(user_id: &str, date: NaiveDate) -> String {
    format!("{user_id}/{date}")
}

fn millis(ts: DateTime<Utc>) -> [u8; 8] {
    (ts.timestamp_millis().max(0) as u64).to_be_bytes()
}

fn window_key(w: &AvailabilityWindow) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..16].copy_from_slice(w.session_id.as_bytes());
    key[16..24].copy_from_slice(&millis(w.starts_at));
    key[24..].copy_from_slice(w.id.as_bytes());
    key
}

fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(0);
    prefix
}

fn event_key(e: &AvailabilityEvent) -> Vec<u8> {
    let mut key = user_prefix(&e.user_id);
    key.extend_from_slice(&millis(e.created_at));
    key.extend_from_slice(e.id.as_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_str<T, Tb>(table: &Tb, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<StrKey, Bytes>,
{
    match table.get(key).map_err(store_err)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn all_str<T, Tb>(table: &Tb) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<StrKey, Bytes>,
{
    let mut out = Vec::new();
    for entry in table.iter().map_err(store_err)? {
        let (_, v) = entry.map_err(store_err)?;
        out.push(decode(v.value())?);
    }
    Ok(out)
}

fn scan_prefix<T, Tb>(table: &Tb, prefix: &[u8]) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<BytesKey, Bytes>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..).map_err(store_err)? {
        let (k, v) = entry.map_err(store_err)?;
        if !k.value().starts_with(prefix) {
            break;
        }
        out.push(decode(v.value())?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tables: one transaction's view of every table
// ---------------------------------------------------------------------------

/// All presence tables opened inside one transaction.
///
/// `ReadTx` is a consistent snapshot; `WriteTx` additionally mutates and is
/// committed only if the closure passed to [`PresenceDb::write`] succeeds.
pub struct Tables<U, S, W, E, P> {
    users: U,
    sessions: S,
    windows: W,
    events: E,
    pings: P,
}

pub type ReadTx = Tables<
    ReadOnlyTable<StrKey, Bytes>,
    ReadOnlyTable<StrKey, Bytes>,
    ReadOnlyTable<BytesKey, Bytes>,
    ReadOnlyTable<BytesKey, Bytes>,
    ReadOnlyTable<BytesKey, Bytes>,
>;

pub type WriteTx<'t> = Tables<
    Table<'t, StrKey, Bytes>,
    Table<'t, StrKey, Bytes>,
    Table<'t, BytesKey, Bytes>,
    Table<'t, BytesKey, Bytes>,
    Table<'t, BytesKey, Bytes>,
>;

impl<U, S, W, E, P> Tables<U, S, W, E, P>
where
    U: ReadableTable<StrKey, Bytes>,
    S: ReadableTable<StrKey, Bytes>,
    W: ReadableTable<BytesKey, Bytes>,
    E: ReadableTable<BytesKey, Bytes>,
    P: ReadableTable<BytesKey, Bytes>,
{
    pub fn user(&self, id: &str) -> Result<Option<User>> {
        get_str(&self.users, id)
    }

    pub fn users(&self) -> Result<Vec<User>> {
        all_str(&self.users)
    }

    pub fn session(&self, user_id: &str, date: NaiveDate) -> Result<Option<AvailabilitySession>> {
        get_str(&self.sessions, &session_key(user_id, date))
    }

    pub fn sessions(&self) -> Result<Vec<AvailabilitySession>> {
        all_str(&self.sessions)
    }

    /// Windows of a session in start order.
    pub fn windows(&self, session_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        scan_prefix(&self.windows, session_id.as_bytes())
    }

    pub fn snapshot(&self, user_id: &str, date: NaiveDate) -> Result<Option<SessionSnapshot>> {
        let Some(session) = self.session(user_id, date)? else {
            return Ok(None);
        };
        let windows = self.windows(session.id)?;
        Ok(Some(SessionSnapshot { session, windows }))
    }

    /// Every event recorded for a user, oldest first.
    pub fn user_events(&self, user_id: &str) -> Result<Vec<AvailabilityEvent>> {
        scan_prefix(&self.events, &user_prefix(user_id))
    }

    /// The newest event of `kind` for `user_id`, if any. Walks the user's
    /// key range backwards and stops at the first match.
    pub fn latest_event(&self, user_id: &str, kind: EventKind) -> Result<Option<AvailabilityEvent>> {
        let start = user_prefix(user_id);
        let mut end = user_id.as_bytes().to_vec();
        end.push(1);
        let range = self
            .events
            .range(start.as_slice()..end.as_slice())
            .map_err(store_err)?;
        for entry in range.rev() {
            let (_, v) = entry.map_err(store_err)?;
            let event: AvailabilityEvent = decode(v.value())?;
            if event.kind == kind {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    pub fn ping(&self, id: Uuid) -> Result<Option<Ping>> {
        match self.pings.get(id.as_bytes().as_slice()).map_err(store_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn pings(&self) -> Result<Vec<Ping>> {
        let mut out = Vec::new();
        for entry in self.pings.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            out.push(decode(v.value())?);
        }
        Ok(out)
    }
}

impl WriteTx<'_> {
    pub fn put_user(&mut self, user: &User) -> Result<()> {
        let value = encode(user)?;
        self.users
            .insert(user.id.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    pub fn put_session(&mut self, session: &AvailabilitySession) -> Result<()> {
        let key = session_key(&session.user_id, session.date);
        let value = encode(session)?;
        self.sessions
            .insert(key.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    /// Insert a window, or overwrite it in place (its key never changes).
    pub fn put_window(&mut self, window: &AvailabilityWindow) -> Result<()> {
        let key = window_key(window);
        let value = encode(window)?;
        self.windows
            .insert(key.as_slice(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    /// Append an audit event. Events are never rewritten.
    pub fn append_event(&mut self, event: &AvailabilityEvent) -> Result<()> {
        let key = event_key(event);
        let value = encode(event)?;
        self.events
            .insert(key.as_slice(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    pub fn put_ping(&mut self, ping: &Ping) -> Result<()> {
        let value = encode(ping)?;
        self.pings
            .insert(ping.id.as_bytes().as_slice(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PresenceDb
// ---------------------------------------------------------------------------

/// Transactional store for users, sessions, windows, events, and pings.
pub struct PresenceDb {
    db: Database,
}

impl PresenceDb {
    /// Open or create the redb database at `path`, creating every table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        {
            wt.open_table(USERS).map_err(store_err)?;
            wt.open_table(SESSIONS).map_err(store_err)?;
            wt.open_table(WINDOWS).map_err(store_err)?;
            wt.open_table(EVENTS).map_err(store_err)?;
            wt.open_table(PINGS).map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTx) -> Result<R>) -> Result<R> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let tables = Tables {
            users: rt.open_table(USERS).map_err(store_err)?,
            sessions: rt.open_table(SESSIONS).map_err(store_err)?,
            windows: rt.open_table(WINDOWS).map_err(store_err)?,
            events: rt.open_table(EVENTS).map_err(store_err)?,
            pings: rt.open_table(PINGS).map_err(store_err)?,
        };
        f(&tables)
    }

    /// Run `f` in a write transaction. Commits when `f` returns `Ok`; any
    /// error aborts the transaction and nothing `f` wrote is kept.
    pub fn write<R>(&self, f: impl FnOnce(&mut WriteTx<'_>) -> Result<R>) -> Result<R> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let result = {
            let mut tables = Tables {
                users: wt.open_table(USERS).map_err(store_err)?,
                sessions: wt.open_table(SESSIONS).map_err(store_err)?,
                windows: wt.open_table(WINDOWS).map_err(store_err)?,
                events: wt.open_table(EVENTS).map_err(store_err)?,
                pings: wt.open_table(PINGS).map_err(store_err)?,
            };
            f(&mut tables)
        };
        match result {
            Ok(value) => {
                wt.commit().map_err(store_err)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = wt.abort() {
                    tracing::warn!("abort after failed write: {abort}");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Users (owned by the surrounding application)
    // -----------------------------------------------------------------------

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.write(|tx| tx.put_user(user))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.read(|tx| tx.user(id))
    }

    /// All users, sorted by name.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut users = self.read(|tx| tx.users())?;
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
