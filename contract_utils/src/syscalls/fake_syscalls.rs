use std::{cell::RefCell, collections::HashSet};

use crate::address::Address;

use super::{Notification, Syscalls};

/// A fake execution environment that can be twiddled for testing
#[derive(Clone, Default, Debug)]
pub struct FakeSyscalls {
    /// Addresses whose witness is attached to the current invocation
    pub witnesses: RefCell<HashSet<Address>>,
    /// Witness every address, regardless of `witnesses`
    pub witness_all: RefCell<bool>,
    /// Every notification published, in order
    pub notifications: RefCell<Vec<Notification>>,
}

impl FakeSyscalls {
    /// Attaches a witness for the address to subsequent invocations
    pub fn authorize(&self, address: &Address) {
        self.witnesses.borrow_mut().insert(*address);
    }

    /// Removes the witness for the address
    pub fn revoke(&self, address: &Address) {
        self.witnesses.borrow_mut().remove(address);
    }

    /// Removes all witnesses
    pub fn clear_witnesses(&self) {
        self.witnesses.borrow_mut().clear();
        self.witness_all.replace(false);
    }

    pub fn last_notification(&self) -> Option<Notification> {
        self.notifications.borrow().last().cloned()
    }

    /// Drains the recorded notifications
    pub fn take_notifications(&self) -> Vec<Notification> {
        self.notifications.take()
    }
}

impl Syscalls for FakeSyscalls {
    fn check_witness(&self, address: &Address) -> bool {
        *self.witness_all.borrow() || self.witnesses.borrow().contains(address)
    }

    fn notify(&self, notification: Notification) {
        self.notifications.borrow_mut().push(notification);
    }
}
