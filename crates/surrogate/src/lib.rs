/*!
This library implements the surrogate models used by model-based search to
predict the objective value of unseen configurations together with an
uncertainty estimate.

Every model implements the [`Surrogate`] trait (`predict_valstd` giving mean and
standard deviation). Models are built from a named [`SurrogateKind`]:

* `RF`: random forest (bootstrap, one random feature per split),
* `ET`: extremely randomized trees (random thresholds, 3 samples per leaf),
* `GBRT`: gradient boosted trees fitted at quantiles 0.16, 0.5 and 0.84,
* `GP`: Gaussian process with squared exponential kernel, the only model
  providing gradients of its predictions,
* `DUMMY`: no model at all, the search keeps sampling randomly.

The forest variance follows the law of total variance over trees: the variance
of a tree is the variance of the training outputs in the reached leaf.

Example:
```
use ambs_surrogate::{Surrogate, SurrogateKind, SurrogateParams};
use ndarray::array;

let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
let gp = SurrogateParams::new(SurrogateKind::GP)
    .train(&xt.view(), &yt.view())
    .expect("GP training");
let (_mean, std, mean_grad, _std_grad) = gp
    .predict_valstd_gradients(&array![2.5].view())
    .expect("GP gradients");
assert!(std > 0.);
assert_eq!(mean_grad.len(), 1);
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod forest;
mod gbrt;
mod gp;
mod params;
mod traits;
mod tree;
mod utils;

pub use errors::*;
pub use forest::*;
pub use gbrt::*;
pub use gp::*;
pub use params::*;
pub use traits::Surrogate;
pub use utils::Workers;
pub use tree::*;
