pub use crate::config::*;

/// A builder for entering the shares of one district and chamber.
///
/// Percentages are given as the operator typed them. A blank entry means that the
/// list has not reported yet and it is left out of the computation.
///
/// ```
/// pub use seat_apportionment::builder::Builder;
/// pub use seat_apportionment::{ApportionmentRules, Chamber};
///
/// let mut builder = Builder::new(&ApportionmentRules::DEFAULT_RULES)?
///     .chamber(Chamber::Lower, 5)?;
///
/// builder.add_share("A", 1, "50")?;
/// builder.add_share("B", 2, "30")?;
/// builder.add_share("C", 3, "20")?;
/// builder.add_share("D", 4, "")?;
///
/// let res = builder.apportion()?;
/// assert_eq!(res.seats_for("A"), 3);
/// assert_eq!(res.seats_for("D"), 0);
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Builder {
    pub(crate) _rules: ApportionmentRules,
    pub(crate) _chamber: Chamber,
    pub(crate) _seats: u32,
    pub(crate) _shares: Vec<ListShare>,
}

impl Builder {
    pub fn new(rules: &ApportionmentRules) -> Result<Builder, ApportionmentErrors> {
        Ok(Builder {
            _rules: rules.clone(),
            _chamber: Chamber::Lower,
            _seats: 0,
            _shares: Vec::new(),
        })
    }

    pub fn chamber(self, chamber: Chamber, seats: u32) -> Result<Builder, ApportionmentErrors> {
        if chamber == Chamber::Upper && seats != 0 && seats != ApportionmentRules::UPPER_SEATS {
            return Err(ApportionmentErrors::UnsupportedSeatCount { chamber, seats });
        }
        Ok(Builder {
            _rules: self._rules,
            _chamber: chamber,
            _seats: seats,
            _shares: Vec::new(),
        })
    }

    /// Adds the share of a list, as typed by an operator.
    ///
    /// An empty string is a pending list and is skipped.
    pub fn add_share(
        &mut self,
        list_id: &str,
        order: u32,
        percentage: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if percentage.trim().is_empty() {
            return Ok(());
        }
        let percentage: Percentage = percentage.parse()?;
        self.add_share_2(&ListShare {
            list_id: list_id.to_string(),
            order,
            percentage,
        })?;
        Ok(())
    }

    pub fn add_share_2(&mut self, share: &ListShare) -> Result<(), ApportionmentErrors> {
        if self._shares.iter().any(|s| s.list_id == share.list_id) {
            return Err(ApportionmentErrors::DuplicateList(share.list_id.clone()));
        }
        self._shares.push(share.clone());
        Ok(())
    }

    pub fn apportion(&self) -> Result<ApportionmentResult, ApportionmentErrors> {
        crate::apportion(self._chamber, &self._shares, self._seats, &self._rules)
    }
}
