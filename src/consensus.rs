//! The asynchronous consensus reducer.
//!
//! Every incoming bid record is classified by who the sender claims won
//! (`SenderClaim`) and who the receiver believes won (`LocalClaim`); one
//! exhaustive match over the pair picks an action on the local view and a
//! rebroadcast. The match *is* the rule table: adding a class without
//! covering its cells fails to compile.

use crate::common::{AgentId, BidInformation};
use crate::dbg_println;
use crate::robot::Robot;

/// The winner named in the incoming record, relative to the exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SenderClaim {
    /// The sender claims the task itself.
    Itself,
    /// The sender believes the receiver won.
    Receiver,
    /// The sender names an uninvolved agent.
    Third(AgentId),
    /// The sender knows no winner.
    Nobody,
}

/// The receiver's current belief, relative to the exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
enum LocalClaim {
    /// We hold the task ourselves.
    Ours,
    /// We believe the sender holds it.
    Sender,
    /// We agree with the sender's named third party.
    Same,
    /// We name a different third party.
    OtherThird,
    /// We know no winner.
    Nobody,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Action {
    /// Adopt the incoming triple, then repair the bundle.
    Update,
    /// Clear the claim to "no winner", then repair the bundle.
    Reset,
    /// Keep the local claim but re-stamp it.
    Refresh,
    Leave,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Rebroadcast {
    /// Propagate the incoming record.
    Sender,
    /// Contradict with the local record.
    Own,
    Nothing,
}

fn classify_sender(claimed: Option<AgentId>, sender: AgentId, receiver: AgentId) -> SenderClaim {
    match claimed {
        Some(w) if w == sender => SenderClaim::Itself,
        Some(w) if w == receiver => SenderClaim::Receiver,
        Some(w) => SenderClaim::Third(w),
        None => SenderClaim::Nobody,
    }
}

fn classify_local(
    local: Option<AgentId>,
    receiver: AgentId,
    sender: AgentId,
    claimed: Option<AgentId>,
) -> LocalClaim {
    match local {
        Some(w) if w == receiver => LocalClaim::Ours,
        Some(w) if w == sender => LocalClaim::Sender,
        Some(w) if Some(w) == claimed => LocalClaim::Same,
        Some(_) => LocalClaim::OtherThird,
        None => LocalClaim::Nobody,
    }
}

/// Both agents name distinct third parties: compare on bid and age
/// together. Agreement in both dimensions picks a side; disagreement means
/// neither record can be trusted and the claim is cleared.
fn bid_and_age(y_k: f64, t_k: f64, y_i: f64, t_i: f64) -> (Action, Rebroadcast) {
    if y_k > y_i && t_k >= t_i {
        (Action::Update, Rebroadcast::Sender)
    } else if y_k < y_i && t_k <= t_i {
        (Action::Leave, Rebroadcast::Own)
    } else if y_k == y_i {
        (Action::Leave, Rebroadcast::Own)
    } else {
        (Action::Reset, Rebroadcast::Sender)
    }
}

/// The rule table. `receiver` is this agent; the local triple is
/// `(y_i, z_i, t_i)`; `eps` is the timestamp tolerance.
pub(crate) fn decide(
    receiver: AgentId,
    msg: &BidInformation,
    y_i: f64,
    z_i: Option<AgentId>,
    t_i: f64,
    eps: f64,
) -> (Action, Rebroadcast) {
    let sender = classify_sender(msg.z, msg.k, receiver);
    let local = classify_local(z_i, receiver, msg.k, msg.z);

    match (sender, local) {
        // --- the sender claims the task itself ---
        (SenderClaim::Itself, LocalClaim::Ours) => {
            if msg.y > y_i {
                (Action::Update, Rebroadcast::Sender)
            } else if msg.y == y_i && msg.k < receiver {
                (Action::Update, Rebroadcast::Sender)
            } else if msg.y < y_i {
                (Action::Refresh, Rebroadcast::Own)
            } else {
                (Action::Leave, Rebroadcast::Own)
            }
        }
        (SenderClaim::Itself, LocalClaim::Sender) => {
            if msg.t > t_i {
                (Action::Update, Rebroadcast::Nothing)
            } else {
                (Action::Leave, Rebroadcast::Nothing)
            }
        }
        (SenderClaim::Itself, LocalClaim::OtherThird) => bid_and_age(msg.y, msg.t, y_i, t_i),
        (SenderClaim::Itself, LocalClaim::Nobody) => (Action::Update, Rebroadcast::Sender),

        // --- the sender believes the receiver won ---
        (SenderClaim::Receiver, LocalClaim::Ours) => {
            if (msg.t - t_i).abs() <= eps {
                (Action::Leave, Rebroadcast::Nothing)
            } else {
                (Action::Leave, Rebroadcast::Own)
            }
        }
        (SenderClaim::Receiver, LocalClaim::Sender) => (Action::Reset, Rebroadcast::Sender),
        (SenderClaim::Receiver, LocalClaim::OtherThird) => (Action::Leave, Rebroadcast::Own),
        (SenderClaim::Receiver, LocalClaim::Nobody) => (Action::Leave, Rebroadcast::Own),

        // --- the sender names a third party ---
        (SenderClaim::Third(w), LocalClaim::Ours) => {
            if msg.y > y_i {
                (Action::Update, Rebroadcast::Sender)
            } else if msg.y == y_i && w < receiver {
                (Action::Update, Rebroadcast::Sender)
            } else if msg.y < y_i {
                (Action::Refresh, Rebroadcast::Own)
            } else {
                (Action::Leave, Rebroadcast::Own)
            }
        }
        (SenderClaim::Third(_), LocalClaim::Sender) => {
            if msg.t >= t_i {
                (Action::Update, Rebroadcast::Sender)
            } else {
                (Action::Reset, Rebroadcast::Sender)
            }
        }
        (SenderClaim::Third(_), LocalClaim::Same) => {
            if msg.t > t_i {
                (Action::Update, Rebroadcast::Nothing)
            } else {
                (Action::Leave, Rebroadcast::Nothing)
            }
        }
        (SenderClaim::Third(_), LocalClaim::OtherThird) => bid_and_age(msg.y, msg.t, y_i, t_i),
        (SenderClaim::Third(_), LocalClaim::Nobody) => (Action::Update, Rebroadcast::Sender),

        // --- the sender knows no winner ---
        (SenderClaim::Nobody, LocalClaim::Ours) => (Action::Leave, Rebroadcast::Own),
        (SenderClaim::Nobody, LocalClaim::Sender) => (Action::Update, Rebroadcast::Sender),
        (SenderClaim::Nobody, LocalClaim::OtherThird) => {
            if msg.t > t_i {
                (Action::Update, Rebroadcast::Sender)
            } else {
                (Action::Leave, Rebroadcast::Own)
            }
        }
        (SenderClaim::Nobody, LocalClaim::Nobody) => (Action::Leave, Rebroadcast::Nothing),

        // `Same` requires the sender to have named a third party
        (
            SenderClaim::Itself | SenderClaim::Receiver | SenderClaim::Nobody,
            LocalClaim::Same,
        ) => (Action::Leave, Rebroadcast::Own),
    }
}

impl Robot {
    /// Reduces one frozen batch of incoming bids, in arrival order, and
    /// returns the records to forward next round.
    ///
    /// Records for unknown tasks are dropped and counted, never fatal.
    /// Rebroadcast-own snapshots the local triple as it stood when the
    /// record was examined.
    pub fn receive_bids(
        &mut self,
        batch: &[BidInformation],
        eps: f64,
        now: f64,
    ) -> Vec<BidInformation> {
        let mut rebroadcasts = Vec::new();
        for msg in batch {
            if !self.tasks.contains(msg.j) {
                self.view.count_dropped_message();
                continue;
            }
            let own = BidInformation {
                y: self.view.winning_bid(msg.j),
                z: self.view.winner(msg.j),
                t: self.view.stamp(msg.j),
                j: msg.j,
                k: self.id,
            };
            let (action, rebroadcast) = decide(self.id, msg, own.y, own.z, own.t, eps);
            dbg_println!(
                "robot {} got {:?} for task {} -> {:?} {:?}",
                self.id,
                msg,
                msg.j,
                action,
                rebroadcast
            );
            match action {
                Action::Update => {
                    self.view.set_bid(msg.j, msg.y, msg.z, msg.t);
                    self.repair_from(msg.j, now);
                }
                Action::Reset => self.reset_task(msg.j, now),
                Action::Refresh => self.view.set_stamp(msg.j, now),
                Action::Leave => {}
            }
            match rebroadcast {
                Rebroadcast::Sender => rebroadcasts.push(BidInformation { k: self.id, ..*msg }),
                Rebroadcast::Own => rebroadcasts.push(own),
                Rebroadcast::Nothing => {}
            }
        }
        rebroadcasts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Point;
    use crate::oracle::Euclidean;
    use crate::robot::{Robot, RobotParams};
    use crate::task::{Task, TaskCatalog};

    const EPS: f64 = 1e-3;

    fn bid(y: f64, z: Option<AgentId>, t: f64, j: usize, k: AgentId) -> BidInformation {
        BidInformation { y, z, t, j, k }
    }

    fn catalog() -> TaskCatalog {
        TaskCatalog::new((0..3).map(|i| {
            let x = 1.0 + 2.0 * i as f64;
            Task::new(i, Point::new(x, 0.0), Point::new(x + 1.0, 0.0), 10.0, None)
        }))
    }

    fn robot(id: AgentId) -> Robot {
        Robot::new(id, Point::new(0.0, 0.0), RobotParams::default(), catalog())
    }

    // --- individual cells ---

    #[test]
    fn stronger_self_claim_overturns_ours() {
        let m = bid(9.0, Some(1), 0.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(0), 0.0, EPS),
            (Action::Update, Rebroadcast::Sender)
        );
    }

    #[test]
    fn equal_self_claims_fall_to_the_lower_id() {
        let m = bid(5.0, Some(0), 0.0, 0, 0);
        // receiver 1 concedes to sender 0
        assert_eq!(
            decide(1, &m, 5.0, Some(1), 0.0, EPS),
            (Action::Update, Rebroadcast::Sender)
        );
        // receiver 0 stands firm against sender 1
        let m = bid(5.0, Some(1), 0.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(0), 0.0, EPS),
            (Action::Leave, Rebroadcast::Own)
        );
    }

    #[test]
    fn weaker_self_claim_is_contradicted_with_a_fresh_stamp() {
        let m = bid(2.0, Some(1), 0.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(0), 0.0, EPS),
            (Action::Refresh, Rebroadcast::Own)
        );
    }

    #[test]
    fn sender_updates_its_own_stale_claim() {
        // we believe the sender holds the task; only newer info changes that
        let newer = bid(4.0, Some(1), 2.0, 0, 1);
        assert_eq!(
            decide(0, &newer, 5.0, Some(1), 1.0, EPS),
            (Action::Update, Rebroadcast::Nothing)
        );
        let stale = bid(4.0, Some(1), 0.5, 0, 1);
        assert_eq!(
            decide(0, &stale, 5.0, Some(1), 1.0, EPS),
            (Action::Leave, Rebroadcast::Nothing)
        );
    }

    #[test]
    fn confirmation_of_our_own_win_is_left_alone() {
        let m = bid(5.0, Some(0), 1.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(0), 1.0, EPS),
            (Action::Leave, Rebroadcast::Nothing)
        );
    }

    #[test]
    fn mutual_claim_confusion_resets() {
        // sender says we won, we say the sender won: nobody is right
        let m = bid(5.0, Some(0), 1.0, 0, 1);
        assert_eq!(
            decide(0, &m, 4.0, Some(1), 0.0, EPS),
            (Action::Reset, Rebroadcast::Sender)
        );
    }

    #[test]
    fn third_party_report_about_the_sender_wins_on_recency() {
        // we think the sender holds the task; a third-party record that is
        // at least as fresh replaces it, an older one clears it
        let fresh = bid(4.0, Some(2), 1.0, 0, 1);
        assert_eq!(
            decide(0, &fresh, 5.0, Some(1), 1.0, EPS),
            (Action::Update, Rebroadcast::Sender)
        );
        let stale = bid(4.0, Some(2), 0.0, 0, 1);
        assert_eq!(
            decide(0, &stale, 5.0, Some(1), 1.0, EPS),
            (Action::Reset, Rebroadcast::Sender)
        );
    }

    #[test]
    fn conflicting_bid_and_age_reset_the_claim() {
        // sender outbids us but with older information
        let m = bid(9.0, Some(2), 0.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(3), 1.0, EPS),
            (Action::Reset, Rebroadcast::Sender)
        );
        // sender is newer but underbids
        let m = bid(2.0, Some(2), 2.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(3), 1.0, EPS),
            (Action::Reset, Rebroadcast::Sender)
        );
    }

    #[test]
    fn free_claims_release_only_what_the_sender_held() {
        // sender renounces its own win as we saw it
        let m = bid(0.0, None, 2.0, 0, 1);
        assert_eq!(
            decide(0, &m, 5.0, Some(1), 1.0, EPS),
            (Action::Update, Rebroadcast::Sender)
        );
        // but our own claim is defended
        assert_eq!(
            decide(0, &m, 5.0, Some(0), 1.0, EPS),
            (Action::Leave, Rebroadcast::Own)
        );
        // and mutual ignorance stays quiet
        assert_eq!(
            decide(0, &m, 0.0, None, 0.0, EPS),
            (Action::Leave, Rebroadcast::Nothing)
        );
    }

    #[test]
    fn every_cell_yields_a_verdict() {
        let winners = [Some(1usize), Some(0), Some(2), Some(3), None];
        let locals = [Some(0usize), Some(1), Some(2), Some(4), None];
        for z_k in winners {
            for z_i in locals {
                for (y_k, y_i) in [(1.0, 2.0), (2.0, 2.0), (3.0, 2.0)] {
                    for (t_k, t_i) in [(0.0, 1.0), (1.0, 1.0), (2.0, 1.0)] {
                        let m = bid(y_k, z_k, t_k, 0, 1);
                        let _ = decide(0, &m, y_i, z_i, t_i, EPS);
                    }
                }
            }
        }
    }

    // --- batch reduction on a live view ---

    #[test]
    fn tied_simultaneous_bids_go_to_the_lower_id() {
        let mut a = robot(0);
        let mut b = robot(1);
        let bids_a = a.build_bundle(&Euclidean, 0.0);
        let bids_b = b.build_bundle(&Euclidean, 0.0);
        // co-located robots produce identical bids
        assert_eq!(bids_a.len(), bids_b.len());

        a.receive_bids(&bids_b, EPS, 0.0);
        b.receive_bids(&bids_a, EPS, 0.0);

        assert_eq!(a.bundle().len(), 3);
        assert!(b.bundle().is_empty());
        for j in 0..3 {
            assert_eq!(a.view().winner(j), Some(0));
            assert_eq!(b.view().winner(j), Some(0));
        }
    }

    #[test]
    fn outbid_truncates_the_bundle_and_demotes_the_task() {
        let mut a = robot(0);
        a.build_bundle(&Euclidean, 0.0);
        assert_eq!(a.bundle().len(), 3);
        let first = a.bundle()[0];
        let later: Vec<_> = a.bundle()[1..].to_vec();

        let steal = bid(a.view().winning_bid(first) + 1.0, Some(1), 1.0, first, 1);
        a.receive_bids(&[steal], EPS, 1.0);

        assert!(!a.bundle().contains(&first));
        assert_eq!(a.view().winner(first), Some(1));
        assert_eq!(a.view().removal_count(first), 1);
        for j in later {
            assert_eq!(a.view().winner(j), None);
            assert_eq!(a.view().winning_bid(j), 0.0);
        }
        a.check_invariants(&Euclidean).unwrap();
    }

    #[test]
    fn unknown_tasks_are_dropped_and_counted() {
        let mut a = robot(0);
        let stray = bid(1.0, Some(1), 0.0, 99, 1);
        let out = a.receive_bids(&[stray], EPS, 0.0);
        assert!(out.is_empty());
        assert_eq!(a.view().dropped_messages(), 1);
    }

    #[test]
    fn convergent_batches_are_idempotent() {
        let mut a = robot(0);
        a.build_bundle(&Euclidean, 0.0);
        let batch = vec![
            // a stronger self-claim for task 0, a confirmation for task 1
            bid(a.view().winning_bid(0) + 2.0, Some(1), 1.0, 0, 1),
            bid(a.view().winning_bid(1), Some(0), 0.0, 1, 1),
        ];

        let mut twice = a.clone();
        a.receive_bids(&batch, EPS, 1.0);
        twice.receive_bids(&batch, EPS, 1.0);
        twice.receive_bids(&batch, EPS, 1.0);

        for j in 0..3 {
            assert_eq!(a.view().winner(j), twice.view().winner(j));
            assert_eq!(a.view().winning_bid(j), twice.view().winning_bid(j));
            assert_eq!(a.view().stamp(j), twice.view().stamp(j));
        }
        assert_eq!(a.bundle(), twice.bundle());
    }

    #[test]
    fn stamps_never_move_backwards() {
        let mut a = robot(0);
        a.build_bundle(&Euclidean, 0.0);
        let before: Vec<f64> = (0..3).map(|j| a.view().stamp(j)).collect();
        let batch = vec![bid(a.view().winning_bid(0) + 1.0, Some(1), 1.0, 0, 1)];
        a.receive_bids(&batch, EPS, 1.0);
        for j in 0..3 {
            assert!(a.view().stamp(j) >= before[j]);
        }
    }

    #[test]
    fn rebroadcast_own_snapshots_the_prior_view() {
        let mut a = robot(0);
        a.build_bundle(&Euclidean, 0.0);
        let y0 = a.view().winning_bid(0);
        // weaker self-claim: refresh our stamp but rebroadcast the old record
        let m = bid(y0 - 1.0, Some(1), 5.0, 0, 1);
        let out = a.receive_bids(&[m], EPS, 5.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].y, y0);
        assert_eq!(out[0].z, Some(0));
        assert_eq!(out[0].k, 0);
    }
}
