/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a replica should play in a given view.

use crate::types::{
    basic::{MemberId, ViewNumber},
    members::Members,
};

/// Determine whether `member` leads `view`, i.e., is the only member allowed to send the view's
/// pre-prepare and new view, and the only member that collects view changes asking to move to it.
pub(crate) fn is_leader(member: &MemberId, view: ViewNumber, members: &Members) -> bool {
    *member == members.leader_for_view(view)
}

/// Determine whether `member` should send a prepare for the block pre-prepared in `view`.
///
/// The leader's vote for its own block is implied by its pre-prepare, so the leader never sends a
/// prepare. Every other member does.
pub(crate) fn is_preparer(member: &MemberId, view: ViewNumber, members: &Members) -> bool {
    members.contains(member) && !is_leader(member, view, members)
}

/// Get the member a replica that times out in `view` should send its view change to: the leader of
/// the next view.
pub(crate) fn view_change_recipient(timed_out_view: ViewNumber, members: &Members) -> MemberId {
    members.leader_for_view(timed_out_view + 1)
}
