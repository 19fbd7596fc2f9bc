mod config;
pub mod builder;
pub mod manual;

use log::{debug, error, info};

use std::{cmp::Ordering, collections::HashSet};

pub use crate::config::*;

// **** Private structures ****

// The key that makes the order between lists total.
#[derive(Eq, PartialEq, Debug, Clone, Ord, PartialOrd)]
enum TiebreakKey {
    ListOrder(u32, String),
    Digest(String, String),
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct RankedShare<'a> {
    share: &'a ListShare,
    key: TiebreakKey,
}

// One entry of the D'Hondt pool: percentage / divisor, owned by a list.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct Quotient {
    list_idx: usize,
    percentage: u64,
    divisor: u64,
}

impl Quotient {
    // a / b > c / d  <=>  a * d > c * b, everything stays in integers.
    fn cmp_value(&self, other: &Quotient) -> Ordering {
        (self.percentage * other.divisor).cmp(&(other.percentage * self.divisor))
    }
}

/// Runs the apportionment rule of the given chamber.
///
/// Arguments:
/// * `chamber` selects the rule: D'Hondt with a threshold for `Lower`, 2 + 1 for `Upper`
/// * `shares` the reported shares, in any order. Lists that did not report must be left out.
/// * `seats` the declared number of seats in dispute
/// * `rules` the threshold and tiebreak policy
///
/// The output has one allocation per input share and does not depend on the order of `shares`.
pub fn apportion(
    chamber: Chamber,
    shares: &[ListShare],
    seats: u32,
    rules: &ApportionmentRules,
) -> Result<ApportionmentResult, ApportionmentErrors> {
    info!(
        "apportion: chamber {} with {} seats, {} reporting lists",
        chamber,
        seats,
        shares.len()
    );
    if chamber == Chamber::Lower && seats > ApportionmentRules::MAX_LOWER_SEATS {
        return Err(ApportionmentErrors::UnsupportedSeatCount { chamber, seats });
    }
    let ranked = checks(shares, rules)?;
    let allocations = match chamber {
        Chamber::Lower => dhondt_allocation(&ranked, seats, rules.lower_threshold),
        Chamber::Upper => majority_minority_allocation(&ranked, seats)?,
    };
    let res = ApportionmentResult {
        chamber,
        seats,
        allocations,
    };
    check_conservation(&res)?;
    Ok(res)
}

/// D'Hondt with an exclusion threshold, for the lower chamber.
pub fn apportion_lower(
    shares: &[ListShare],
    seats: u32,
    rules: &ApportionmentRules,
) -> Result<ApportionmentResult, ApportionmentErrors> {
    apportion(Chamber::Lower, shares, seats, rules)
}

/// Majority and first minority (2 + 1), for the upper chamber.
pub fn apportion_upper(
    shares: &[ListShare],
    seats: u32,
    rules: &ApportionmentRules,
) -> Result<ApportionmentResult, ApportionmentErrors> {
    apportion(Chamber::Upper, shares, seats, rules)
}

// Shares are returned sorted by tiebreak key.
fn checks<'a>(
    shares: &'a [ListShare],
    rules: &ApportionmentRules,
) -> Result<Vec<RankedShare<'a>>, ApportionmentErrors> {
    let mut seen: HashSet<&str> = HashSet::new();
    for s in shares.iter() {
        if !seen.insert(s.list_id.as_str()) {
            return Err(ApportionmentErrors::DuplicateList(s.list_id.clone()));
        }
    }
    let total: Percentage = shares.iter().map(|s| s.percentage).sum();
    if total > Percentage::FULL {
        return Err(ApportionmentErrors::SharesExceedTotal(total));
    }

    let mut ranked: Vec<RankedShare> = shares
        .iter()
        .map(|share| RankedShare {
            share,
            key: tiebreak_key(share, rules.tiebreak_mode),
        })
        .collect();
    ranked.sort_by(|a, b| a.key.cmp(&b.key));
    debug!(
        "checks: tiebreak order {:?}",
        ranked
            .iter()
            .map(|r| r.share.list_id.as_str())
            .collect::<Vec<&str>>()
    );
    Ok(ranked)
}

fn tiebreak_key(share: &ListShare, mode: TieBreakMode) -> TiebreakKey {
    match mode {
        TieBreakMode::UseListOrder => TiebreakKey::ListOrder(share.order, share.list_id.clone()),
        TieBreakMode::Random(seed) => TiebreakKey::Digest(
            list_digest(&share.list_id, seed),
            share.list_id.clone(),
        ),
    }
}

/// A stable pseudo-random position for a list. It is hard to guess in advance but
/// reproducible by anyone who knows the seed.
fn list_digest(list_id: &str, seed: u32) -> String {
    let input = format!("{:08}{}", seed, list_id);
    sha256::digest(input.as_str())
}

fn empty_allocations(ranked: &[RankedShare]) -> Vec<SeatAllocation> {
    ranked
        .iter()
        .map(|r| SeatAllocation {
            list_id: r.share.list_id.clone(),
            order: r.share.order,
            percentage: r.share.percentage,
            seats: 0,
            qualified: false,
        })
        .collect()
}

fn dhondt_allocation(
    ranked: &[RankedShare],
    seats: u32,
    threshold: Percentage,
) -> Vec<SeatAllocation> {
    let mut allocations = empty_allocations(ranked);

    // Lists that reported zero never compete.
    let contenders: Vec<usize> = ranked
        .iter()
        .enumerate()
        .filter(|(_, r)| r.share.percentage > Percentage::ZERO)
        .map(|(idx, _)| idx)
        .collect();
    let above_threshold: Vec<usize> = contenders
        .iter()
        .cloned()
        .filter(|idx| ranked[*idx].share.percentage >= threshold)
        .collect();
    // Nobody reached the threshold: everyone who got votes competes rather
    // than leaving the seats empty.
    let qualifying = if above_threshold.is_empty() {
        if !contenders.is_empty() {
            debug!(
                "dhondt_allocation: no list reached {}%, falling back to {} reporting lists",
                threshold,
                contenders.len()
            );
        }
        contenders
    } else {
        above_threshold
    };
    for idx in qualifying.iter() {
        allocations[*idx].qualified = true;
    }
    if seats == 0 || qualifying.is_empty() {
        return allocations;
    }

    let mut pool: Vec<Quotient> = Vec::with_capacity(qualifying.len() * seats as usize);
    for idx in qualifying.iter() {
        for divisor in 1..=(seats as u64) {
            pool.push(Quotient {
                list_idx: *idx,
                percentage: ranked[*idx].share.percentage.hundredths() as u64,
                divisor,
            });
        }
    }
    // Highest quotient first. Equal quotients go to the list that comes first in the
    // tiebreak order, which is the index in `ranked`.
    pool.sort_by(|a, b| {
        b.cmp_value(a)
            .then_with(|| a.list_idx.cmp(&b.list_idx))
            .then_with(|| a.divisor.cmp(&b.divisor))
    });

    for q in pool.iter().take(seats as usize) {
        debug!(
            "dhondt_allocation: seat to {} ({} / {})",
            ranked[q.list_idx].share.list_id,
            ranked[q.list_idx].share.percentage,
            q.divisor
        );
        allocations[q.list_idx].seats += 1;
    }
    allocations
}

fn majority_minority_allocation(
    ranked: &[RankedShare],
    seats: u32,
) -> Result<Vec<SeatAllocation>, ApportionmentErrors> {
    let mut allocations = empty_allocations(ranked);
    if seats == 0 {
        return Ok(allocations);
    }
    if seats != ApportionmentRules::UPPER_SEATS {
        return Err(ApportionmentErrors::UnsupportedSeatCount {
            chamber: Chamber::Upper,
            seats,
        });
    }

    // Every reporting list is ranked, including the ones at 0%.
    let mut contenders: Vec<usize> = (0..ranked.len()).collect();
    // Stable sort: equal percentages keep the tiebreak order.
    contenders.sort_by(|a, b| ranked[*b].share.percentage.cmp(&ranked[*a].share.percentage));
    for idx in contenders.iter() {
        allocations[*idx].qualified = true;
    }

    match contenders.as_slice() {
        [] => {}
        [single] => {
            debug!(
                "majority_minority_allocation: {} is the only reporting list",
                ranked[*single].share.list_id
            );
            allocations[*single].seats = seats;
        }
        [first, second, ..] => {
            allocations[*first].seats = ApportionmentRules::UPPER_MAJORITY_SEATS;
            allocations[*second].seats = seats - ApportionmentRules::UPPER_MAJORITY_SEATS;
        }
    }
    Ok(allocations)
}

fn check_conservation(res: &ApportionmentResult) -> Result<(), ApportionmentErrors> {
    let assigned = res.assigned_seats();
    let has_contenders = res.allocations.iter().any(|a| a.qualified);
    let expected = if has_contenders { res.seats } else { 0 };
    if assigned != expected {
        error!(
            "check_conservation: {} chamber assigned {} seats, expected {}: {:?}",
            res.chamber, assigned, expected, res.allocations
        );
        return Err(ApportionmentErrors::SeatCountMismatch {
            chamber: res.chamber,
            declared: res.seats,
            assigned,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn share(id: &str, order: u32, pct: &str) -> ListShare {
        ListShare {
            list_id: id.to_string(),
            order,
            percentage: pct.parse().unwrap(),
        }
    }

    fn seats_of(res: &ApportionmentResult) -> Vec<(String, u32)> {
        res.allocations
            .iter()
            .map(|a| (a.list_id.clone(), a.seats))
            .collect()
    }

    fn rules() -> ApportionmentRules {
        ApportionmentRules::DEFAULT_RULES
    }

    #[test]
    fn lower_proportional_five_seats() {
        init();
        let shares = vec![share("A", 1, "50"), share("B", 2, "30"), share("C", 3, "20")];
        let res = apportion_lower(&shares, 5, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 3);
        assert_eq!(res.seats_for("B"), 1);
        assert_eq!(res.seats_for("C"), 1);
        assert_eq!(res.assigned_seats(), 5);
    }

    #[test]
    fn lower_three_seats() {
        init();
        let shares = vec![share("A", 1, "50"), share("B", 2, "30"), share("C", 3, "20")];
        let res = apportion_lower(&shares, 3, &rules()).unwrap();
        assert_eq!(
            seats_of(&res),
            vec![
                ("A".to_string(), 2),
                ("B".to_string(), 1),
                ("C".to_string(), 0)
            ]
        );
    }

    #[test]
    fn lower_threshold_excludes_small_lists() {
        init();
        let shares = vec![share("A", 1, "96"), share("B", 2, "2"), share("C", 3, "2")];
        let res = apportion_lower(&shares, 5, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 5);
        assert_eq!(res.seats_for("B"), 0);
        assert_eq!(res.seats_for("C"), 0);
        let excluded: Vec<&str> = res
            .allocations
            .iter()
            .filter(|a| !a.qualified)
            .map(|a| a.list_id.as_str())
            .collect();
        assert_eq!(excluded, vec!["B", "C"]);
    }

    #[test]
    fn lower_threshold_is_inclusive() {
        init();
        // 3.00 qualifies, 2.99 does not.
        let shares = vec![
            share("A", 1, "10"),
            share("B", 2, "3.00"),
            share("C", 3, "2.99"),
        ];
        let res = apportion_lower(&shares, 30, &rules()).unwrap();
        assert!(res.allocations.iter().find(|a| a.list_id == "B").unwrap().qualified);
        assert!(res.seats_for("B") > 0);
        assert_eq!(res.seats_for("C"), 0);
    }

    #[test]
    fn lower_fallback_when_nobody_qualifies() {
        init();
        let shares = vec![share("A", 1, "2.5"), share("B", 2, "1")];
        let res = apportion_lower(&shares, 3, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), 3);
        assert_eq!(res.seats_for("A"), 2);
        assert_eq!(res.seats_for("B"), 1);
    }

    #[test]
    fn lower_single_list_below_threshold_takes_all() {
        init();
        let shares = vec![share("A", 1, "1.5")];
        let res = apportion_lower(&shares, 4, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 4);
    }

    #[test]
    fn lower_no_report_assigns_nothing() {
        init();
        let res = apportion_lower(&[], 5, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), 0);
        assert!(res.allocations.is_empty());

        let zeros = vec![share("A", 1, "0"), share("B", 2, "0")];
        let res = apportion_lower(&zeros, 5, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), 0);
        assert!(res.allocations.iter().all(|a| !a.qualified));
    }

    #[test]
    fn lower_tie_goes_to_lower_order() {
        init();
        // Quotients 40, 40, 20, 20: the third seat is a tie.
        let shares = vec![share("A", 2, "40"), share("B", 1, "40")];
        let res = apportion_lower(&shares, 3, &rules()).unwrap();
        assert_eq!(res.seats_for("B"), 2);
        assert_eq!(res.seats_for("A"), 1);
    }

    #[test]
    fn lower_tie_same_order_goes_to_lower_identifier() {
        init();
        let shares = vec![share("Z", 1, "40"), share("M", 1, "40")];
        let res = apportion_lower(&shares, 1, &rules()).unwrap();
        assert_eq!(res.seats_for("M"), 1);
        assert_eq!(res.seats_for("Z"), 0);
    }

    #[test]
    fn random_tiebreak_is_reproducible() {
        init();
        let rules = ApportionmentRules {
            tiebreak_mode: TieBreakMode::Random(42),
            ..ApportionmentRules::DEFAULT_RULES
        };
        let shares = vec![share("A", 1, "30"), share("B", 2, "30"), share("C", 3, "30")];
        let first = apportion_lower(&shares, 1, &rules).unwrap();
        let second = apportion_lower(&shares, 1, &rules).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.assigned_seats(), 1);

        let winner = first.allocations.iter().find(|a| a.seats == 1).unwrap();
        let expected = ["A", "B", "C"]
            .iter()
            .min_by_key(|id| list_digest(id, 42))
            .unwrap();
        assert_eq!(winner.list_id, *expected);
    }

    #[test]
    fn input_order_does_not_matter() {
        init();
        let shares = vec![
            share("A", 1, "33.33"),
            share("B", 2, "33.33"),
            share("C", 3, "20.10"),
            share("D", 4, "2.50"),
        ];
        let mut reversed = shares.clone();
        reversed.reverse();
        for chamber in Chamber::ALL {
            let seats = if chamber == Chamber::Upper { 3 } else { 7 };
            let a = apportion(chamber, &shares, seats, &rules()).unwrap();
            let b = apportion(chamber, &reversed, seats, &rules()).unwrap();
            let c = apportion(chamber, &shares, seats, &rules()).unwrap();
            assert_eq!(a, b);
            assert_eq!(a, c);
        }
    }

    #[test]
    fn lower_conserves_seats() {
        init();
        let cases: Vec<Vec<ListShare>> = vec![
            vec![share("A", 1, "45.12"), share("B", 2, "31.07"), share("C", 3, "3")],
            vec![share("A", 1, "100")],
            vec![share("A", 1, "12.5"), share("B", 2, "12.5"), share("C", 3, "12.5")],
            vec![share("A", 1, "0.01"), share("B", 2, "4"), share("C", 3, "0")],
        ];
        for shares in cases.iter() {
            for seats in 1..=12 {
                let res = apportion_lower(shares, seats, &rules()).unwrap();
                assert_eq!(res.assigned_seats(), seats, "{:?}", shares);
            }
        }
    }

    #[test]
    fn upper_majority_and_first_minority() {
        init();
        let shares = vec![share("A", 1, "45"), share("B", 2, "35"), share("C", 3, "20")];
        let res = apportion_upper(&shares, 3, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 2);
        assert_eq!(res.seats_for("B"), 1);
        assert_eq!(res.seats_for("C"), 0);
    }

    #[test]
    fn upper_ignores_the_threshold() {
        init();
        let shares = vec![share("A", 1, "97.5"), share("B", 2, "2.5")];
        let res = apportion_upper(&shares, 3, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 2);
        assert_eq!(res.seats_for("B"), 1);
    }

    #[test]
    fn upper_single_reporter_takes_all() {
        init();
        let res = apportion_upper(&[share("A", 1, "60")], 3, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 3);
    }

    #[test]
    fn upper_counts_lists_that_reported_zero() {
        init();
        let shares = vec![share("A", 1, "60"), share("B", 2, "0")];
        let res = apportion_upper(&shares, 3, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 2);
        assert_eq!(res.seats_for("B"), 1);

        let res = apportion_upper(&[share("A", 1, "0")], 3, &rules()).unwrap();
        assert_eq!(res.seats_for("A"), 3);
        assert!(res.allocations[0].qualified);
    }

    #[test]
    fn upper_no_reporter() {
        init();
        let res = apportion_upper(&[], 3, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), 0);
    }

    #[test]
    fn upper_tie_uses_order() {
        init();
        let shares = vec![share("A", 3, "40"), share("B", 1, "40"), share("C", 2, "20")];
        let res = apportion_upper(&shares, 3, &rules()).unwrap();
        assert_eq!(res.seats_for("B"), 2);
        assert_eq!(res.seats_for("A"), 1);
        assert_eq!(res.seats_for("C"), 0);
    }

    #[test]
    fn lower_rejects_oversized_renewals() {
        init();
        let shares = vec![share("A", 1, "60"), share("B", 2, "40")];
        assert_eq!(
            apportion_lower(&shares, u32::MAX, &rules()),
            Err(ApportionmentErrors::UnsupportedSeatCount {
                chamber: Chamber::Lower,
                seats: u32::MAX
            })
        );
        let res = apportion_lower(&shares, ApportionmentRules::MAX_LOWER_SEATS, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), ApportionmentRules::MAX_LOWER_SEATS);
    }

    #[test]
    fn upper_not_renewed() {
        init();
        let shares = vec![share("A", 1, "60"), share("B", 2, "40")];
        let res = apportion_upper(&shares, 0, &rules()).unwrap();
        assert_eq!(res.assigned_seats(), 0);
    }

    #[test]
    fn upper_rejects_other_seat_counts() {
        init();
        let shares = vec![share("A", 1, "60"), share("B", 2, "40")];
        assert_eq!(
            apportion_upper(&shares, 5, &rules()),
            Err(ApportionmentErrors::UnsupportedSeatCount {
                chamber: Chamber::Upper,
                seats: 5
            })
        );
    }

    #[test]
    fn rejects_bad_input() {
        init();
        let dup = vec![share("A", 1, "10"), share("A", 2, "20")];
        assert_eq!(
            apportion_lower(&dup, 3, &rules()),
            Err(ApportionmentErrors::DuplicateList("A".to_string()))
        );
        let over = vec![share("A", 1, "70"), share("B", 2, "40")];
        assert_eq!(
            apportion_lower(&over, 3, &rules()),
            Err(ApportionmentErrors::SharesExceedTotal(
                Percentage::from_hundredths(11_000)
            ))
        );
    }

    #[test]
    fn conservation_check_flags_defects() {
        init();
        let res = ApportionmentResult {
            chamber: Chamber::Lower,
            seats: 3,
            allocations: vec![SeatAllocation {
                list_id: "A".to_string(),
                order: 1,
                percentage: Percentage::from_hundredths(5000),
                seats: 2,
                qualified: true,
            }],
        };
        assert!(matches!(
            check_conservation(&res),
            Err(ApportionmentErrors::SeatCountMismatch { assigned: 2, .. })
        ));
    }

    #[test]
    fn percentage_parsing() {
        assert_eq!(Percentage::parse_hundredths("55.5"), Ok(5550));
        assert_eq!(Percentage::parse_hundredths(" 55.50 "), Ok(5550));
        assert_eq!(Percentage::parse_hundredths("7"), Ok(700));
        assert_eq!(Percentage::parse_hundredths(".25"), Ok(25));
        assert_eq!(Percentage::parse_hundredths("-1"), Ok(-100));
        assert!(Percentage::parse_hundredths("12.345").is_err());
        assert!(Percentage::parse_hundredths("abc").is_err());
        assert!(Percentage::parse_hundredths("").is_err());
        assert!(Percentage::parse_hundredths("1e2").is_err());
        assert!("100.01".parse::<Percentage>().is_err());
        assert_eq!("100".parse::<Percentage>(), Ok(Percentage::FULL));
        assert_eq!(Percentage::from_hundredths(605).to_string(), "6.05");
        assert_eq!(Percentage::ratio(1, 3), Some(Percentage::from_hundredths(3333)));
        assert_eq!(Percentage::ratio(2, 3), Some(Percentage::from_hundredths(6667)));
        assert_eq!(Percentage::ratio(5, 0), None);
    }
}
