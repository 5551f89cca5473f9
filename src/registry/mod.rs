//! Connection registry for chat fan-out
//!
//! The registry is the authoritative set of connections eligible for
//! broadcast. It is the only state shared by every task in the hub, so all
//! access goes through one `RwLock`. No lock is held across a write to a
//! client.
//!
//! ```text
//!                 Arc<ConnectionRegistry>
//!            ┌─────────────────────────────┐
//!            │ connections: HashMap<Id,    │
//!            │   Arc<Connection>>          │
//!            └──────────────┬──────────────┘
//!                           │
//!      ┌────────────────────┼────────────────────┐
//!      │                    │                    │
//!      ▼                    ▼                    ▼
//!  chat admission      ReadLoop exit        Broadcaster
//!  add()               remove()             snapshot() ──► enqueue per recipient
//! ```

pub mod store;

pub use store::ConnectionRegistry;
