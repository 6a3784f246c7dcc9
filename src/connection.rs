//! Client connection context.

use std::rc::{Rc, Weak};

use crate::types::ClientId;

/// A client context that submits atoms.
///
/// The scheduler uses connection identity for two things only: scoping
/// priority preemption (atoms preempt within their own connection) and
/// bulk cancellation. It never owns the connection; atoms hold weak
/// back-references.
#[derive(Debug)]
pub struct Connection {
    client_id: ClientId,
}

impl Connection {
    pub fn new(client_id: ClientId) -> Rc<Connection> {
        Rc::new(Connection { client_id })
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

/// Identity comparison of two weak connection references.
///
/// Two dead references compare equal, so orphaned atoms still group
/// together for priority scoping until their cancellation lands.
pub(crate) fn same_connection(a: &Weak<Connection>, b: &Weak<Connection>) -> bool {
    match (a.upgrade(), b.upgrade()) {
        (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
        (None, None) => true,
        _ => false,
    }
}
