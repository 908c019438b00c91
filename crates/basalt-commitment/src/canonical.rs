//! The canonical text form shared by the anchor commitment builder and the
//! snapshot journal (spec §4.4 step 2, §4.6): one line per entity in a
//! stable field order, grouped under a `kind:count` header, the whole thing
//! under a `L2STATE|v1` version line. Sorting happens here so callers never
//! need to think about entity order before canonicalising.

use crate::snapshot::L2StateSnapshot;

pub fn canonicalize(snapshot: &L2StateSnapshot) -> String {
    let mut balances = snapshot.balances.clone();
    balances.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

    let mut escrows = snapshot.escrows.clone();
    escrows.sort_by(|a, b| a.task_id.cmp(&b.task_id));

    let mut pegins = snapshot.pegins.clone();
    pegins.sort_by(|a, b| a.peg_id.cmp(&b.peg_id));

    let mut pegouts = snapshot.pegouts.clone();
    pegouts.sort_by(|a, b| a.peg_id.cmp(&b.peg_id));

    let mut tasks = snapshot.tasks.clone();
    tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));

    let mut lines = Vec::new();
    lines.push("L2STATE|v1".to_string());

    lines.push(format!("balance:{}", balances.len()));
    for b in &balances {
        lines.push(format!("balance:{}:{}", b.peer_id, b.balance));
    }

    lines.push(format!("escrow:{}", escrows.len()));
    for e in &escrows {
        lines.push(format!(
            "escrow:{}:{}:{}:{}:{}",
            e.task_id, e.client_peer_id, e.amount, e.locked, e.created_at
        ));
    }

    lines.push(format!("pegin:{}", pegins.len()));
    for p in &pegins {
        lines.push(format!(
            "pegin:{}:{}:{}:{}",
            p.peg_id, p.status, p.l1_amount, p.l2_mint_amount
        ));
    }

    lines.push(format!("pegout:{}", pegouts.len()));
    for p in &pegouts {
        lines.push(format!(
            "pegout:{}:{}:{}:{}",
            p.peg_id, p.status, p.l2_burn_amount, p.l1_release_amount
        ));
    }

    lines.push(format!("task:{}", tasks.len()));
    for t in &tasks {
        lines.push(format!(
            "task:{}:{}:{}:{}:{}:{}:{}",
            t.task_id,
            t.task_type,
            t.priority,
            t.submitter_id,
            t.submitted_at,
            t.payload_hash,
            t.bound_anchor_hash.as_deref().unwrap_or("-"),
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::BalanceEntry;

    #[test]
    fn entity_order_does_not_affect_canonical_form() {
        let mut s1 = L2StateSnapshot::default();
        s1.balances = vec![
            BalanceEntry { peer_id: "p1".into(), balance: 5 },
            BalanceEntry { peer_id: "p2".into(), balance: 10 },
        ];
        let mut s2 = s1.clone();
        s2.balances.reverse();

        assert_eq!(canonicalize(&s1), canonicalize(&s2));
    }

    #[test]
    fn changing_a_balance_changes_the_canonical_form() {
        let mut s1 = L2StateSnapshot::default();
        s1.balances = vec![BalanceEntry { peer_id: "p2".into(), balance: 10 }];
        let mut s2 = s1.clone();
        s2.balances[0].balance = 11;

        assert_ne!(canonicalize(&s1), canonicalize(&s2));
    }
}
