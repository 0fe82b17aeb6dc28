/*!
This library implements the surrogate-based ask/tell optimizer of model-based
search together with its acquisition engine.

Acquisition functions score candidate points (encoded in the unit hypercube) from
the mean and standard deviation predicted by a [`Surrogate`](ambs_surrogate::Surrogate),
lower being better:

* `LCB`: `mu - kappa * std`,
* `EI`, `PI`: negated expected improvement and probability of improvement
  over the best objective value `y_opt` minus `xi`,
* `EIps`, `PIps`: the same criteria divided by the predicted evaluation time,
  given by a second surrogate fitted on `ln(duration)`,
* `gp_hedge`: a portfolio of `EI`, `LCB` and `PI` where the member to follow is
  drawn according to past rewards.

The [`Optimizer`] samples the search space until `n_initial_points` outcomes are
told, then fits its surrogate at each tell and proposes batches of points with a
[`MultiPointStrategy`]: constant liar (`cl_min`, `cl_mean`, `cl_max`), `topk`
or `boltzmann`.

Example:
```
use ambs_optim::{MultiPointStrategy, Optimizer, OptimizerConfig, Outcome};
use ambs_space::{Dimension, Space};

let space = Space::new(vec![
    Dimension::integer("units", 1, 100).unwrap(),
    Dimension::categorical("activation", &["relu", "tanh"]).unwrap(),
])
.unwrap();
let config = OptimizerConfig::default()
    .n_initial_points(4)
    .n_points(100)
    .seed(42);
let mut optimizer = Optimizer::new(space, config).unwrap();
for _ in 0..3 {
    let batch = optimizer.ask(2, MultiPointStrategy::ClMax).unwrap();
    let outcomes: Vec<Outcome> = batch
        .iter()
        .map(|x| Outcome::Success((x[0].as_f64().unwrap() - 30.).abs()))
        .collect();
    optimizer.tell(&batch, &outcomes).unwrap();
}
assert!(optimizer.is_fitted());
println!("best: {:?}", optimizer.best());
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod acquisition;
mod config;
mod errors;
mod history;
mod lbfgs;
mod optimizer;
mod portfolio;

pub use acquisition::*;
pub use config::*;
pub use errors::*;
pub use history::*;
pub use optimizer::*;
pub use portfolio::*;
