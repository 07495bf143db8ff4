//! Submission bookkeeping for one channel.
//!
//! Submissions go through two stages before reaching hardware: a
//! `submit` puts the descriptor on the submitted list and assigns its
//! cookie, and a later `issue_pending` moves everything submitted so
//! far onto the issued list, from which descriptors are loaded into
//! hardware one at a time. Cookies are per-channel sequence numbers;
//! completion is recorded by remembering the most recently completed
//! cookie, and comparisons use wrapping signed distance so the counter
//! can roll over.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Completion token for one submission. Only meaningful on the channel
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie(pub(crate) u32);

pub(crate) struct VirtQueue<D> {
    submitted: VecDeque<(Cookie, D)>,
    issued: VecDeque<(Cookie, D)>,
    next_cookie: u32,
    completed_cookie: u32,
}

impl<D> VirtQueue<D> {
    pub(crate) fn new() -> VirtQueue<D> {
        VirtQueue {
            submitted: VecDeque::new(),
            issued: VecDeque::new(),
            next_cookie: 1,
            completed_cookie: 0,
        }
    }

    pub(crate) fn submit(&mut self, desc: D) -> Cookie {
        let cookie = Cookie(self.next_cookie);
        self.next_cookie = self.next_cookie.wrapping_add(1);
        if self.next_cookie == 0 {
            self.next_cookie = 1;
        }
        self.submitted.push_back((cookie, desc));
        cookie
    }

    /// Move everything submitted so far to the issued list. Returns
    /// true if anything is now waiting to be loaded into hardware.
    pub(crate) fn issue_pending(&mut self) -> bool {
        self.issued.append(&mut self.submitted);
        !self.issued.is_empty()
    }

    pub(crate) fn pop_issued(&mut self) -> Option<(Cookie, D)> {
        self.issued.pop_front()
    }

    /// Drain both lists, for teardown.
    pub(crate) fn take_all(&mut self) -> Vec<(Cookie, D)> {
        let mut all: Vec<(Cookie, D)> = self.submitted.drain(..).collect();
        all.extend(self.issued.drain(..));
        all
    }

    pub(crate) fn complete(&mut self, cookie: Cookie) {
        self.completed_cookie = cookie.0;
    }

    pub(crate) fn is_complete(&self, cookie: Cookie) -> bool {
        // Wrapping signed distance; cookies complete in issue order.
        self.completed_cookie.wrapping_sub(cookie.0) as i32 >= 0 && self.completed_cookie != 0
    }

    pub(crate) fn find(&self, cookie: Cookie) -> Option<&D> {
        self.submitted
            .iter()
            .chain(self.issued.iter())
            .find(|(c, _)| *c == cookie)
            .map(|(_, d)| d)
    }
}
