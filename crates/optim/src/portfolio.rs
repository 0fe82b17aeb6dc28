//! Portfolio of acquisition criteria (`gp_hedge`).
//!
//! At each ask every member proposes its best candidate and one of them is
//! picked with a softmax over the accumulated gains. When the surrogate is
//! refitted, each member is rewarded with minus the new posterior mean at its
//! last proposal.
use crate::acquisition::AcqFunc;
use crate::errors::Result;
use ambs_surrogate::Surrogate;
use log::debug;
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

/// Criteria of the portfolio
pub const HEDGE_MEMBERS: [AcqFunc; 3] = [AcqFunc::EI, AcqFunc::LCB, AcqFunc::PI];

/// `gp_hedge` state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hedge {
    gains: [f64; 3],
    eta: f64,
    proposals: Option<Array2<f64>>,
}

impl Default for Hedge {
    fn default() -> Self {
        Hedge {
            gains: [0.; 3],
            eta: 1.,
            proposals: None,
        }
    }
}

impl Hedge {
    /// Accumulated gains of the members
    pub fn gains(&self) -> &[f64; 3] {
        &self.gains
    }

    /// Softmax of `eta * gains`
    pub fn probabilities(&self) -> [f64; 3] {
        let max = self.gains.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights = self.gains.map(|g| (self.eta * (g - max)).exp());
        let total: f64 = weights.iter().sum();
        weights.map(|w| w / total)
    }

    /// Draw the index of the member to follow
    pub fn choose<R: Rng>(&self, rng: &mut R) -> usize {
        let probs = self.probabilities();
        let u: f64 = rng.gen();
        let mut cumul = 0.;
        for (i, p) in probs.iter().enumerate() {
            cumul += p;
            if u < cumul {
                return i;
            }
        }
        probs.len() - 1
    }

    /// Remember the (encoded) proposal of each member
    pub fn record(&mut self, proposals: Array2<f64>) {
        self.proposals = Some(proposals);
    }

    /// Reward the members with the posterior of the refitted `model`
    pub fn update(&mut self, model: &dyn Surrogate) -> Result<()> {
        if let Some(proposals) = self.proposals.take() {
            let mean: Array1<f64> = model.predict(&proposals.view())?;
            for (gain, m) in self.gains.iter_mut().zip(mean.iter()) {
                *gain -= m;
            }
            debug!("Hedge gains {:?}", self.gains);
        }
        Ok(())
    }

    /// Proposal of a member, if any is recorded
    pub fn proposal(&self, member: usize) -> Option<Array1<f64>> {
        self.proposals
            .as_ref()
            .map(|p| p.index_axis(Axis(0), member).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::tests::Bowl;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_uniform_start() {
        let hedge = Hedge::default();
        hedge
            .probabilities()
            .iter()
            .for_each(|p| assert_abs_diff_eq!(*p, 1. / 3.));
    }

    #[test]
    fn test_update_favours_low_mean() {
        let mut hedge = Hedge::default();
        hedge.record(array![[0.3, 0.3, 0.3], [0.9, 0.9, 0.9], [0.5, 0.5, 0.5]]);
        hedge.update(&Bowl).unwrap();
        let probs = hedge.probabilities();
        assert!(probs[0] > probs[2] && probs[2] > probs[1]);
        assert_abs_diff_eq!(probs.iter().sum::<f64>(), 1., epsilon = 1e-12);
        // proposals are consumed
        assert!(hedge.proposal(0).is_none());
        let gains = *hedge.gains();
        hedge.update(&Bowl).unwrap();
        assert_eq!(&gains, hedge.gains());

        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let picks = (0..200).filter(|_| hedge.choose(&mut rng) == 0).count();
        assert!(picks > 70, "picks = {picks}");
    }
}
