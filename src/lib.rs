/*!
This library implements an asynchronous model-based search (AMBS) for expensive
black-box objectives evaluated concurrently by a pool of workers.

The search keeps every worker busy: each time evaluations complete, their
outcomes are told to a surrogate-based [`Optimizer`](ambs_optim::Optimizer)
which is asked for as many new configurations as were received. The objective
returned by the evaluator is *maximized*; it is negated for the underlying
optimizer which minimizes.

The workspace is organized as follows:

* `ambs-space`: search space (continuous, integer and categorical dimensions),
  sampling, encoding and prior-guided reshaping,
* `ambs-surrogate`: surrogate models (random forest, extra trees, quantile
  gradient boosting, Gaussian process),
* `ambs-optim`: acquisition functions and the ask/tell optimizer,
* `ambs` (this crate): evaluators, the search loop and warm start from the
  results of a previous search.

Example:
```no_run
use ambs::{Ambs, Checkpoint, Problem, SearchConfig, ThreadEvaluator};
use ambs_space::{Dimension, NamedConfig, Scale, Space, Value};

fn run(config: &NamedConfig) -> anyhow::Result<f64> {
    let lr = config["lr"].as_f64().unwrap_or(f64::NAN);
    let units = config["units"].as_f64().unwrap_or(f64::NAN);
    let bonus = if config["activation"] == Value::from("relu") { 0.1 } else { 0. };
    Ok(bonus - (lr.log10() + 2.).powi(2) - ((units - 64.) / 64.).powi(2))
}

let space = Space::new(vec![
    Dimension::continuous("lr", 1e-5, 1e-1, Scale::Log).unwrap(),
    Dimension::integer("units", 8, 256).unwrap(),
    Dimension::categorical("activation", &["relu", "tanh", "sigmoid"]).unwrap(),
])
.unwrap();
let evaluator = ThreadEvaluator::new(run, 4).unwrap();
let config = SearchConfig::default()
    .surrogate_model("RF")
    .acq_func("UCB")
    .multi_point_strategy("cl_max")
    .seed(42);
let mut search = Ambs::new(Problem::new(space), evaluator, config).unwrap();
// warm start from a previous run
let checkpoint = Checkpoint::from_path("results.csv").unwrap();
search.fit_surrogate(&checkpoint).unwrap();
let result = search.search(Some(100), None).unwrap();
println!("{result}");
```

Logging is done with the `log` crate and `env_logger` initialized from the
`AMBS_LOG` environment variable (default `info`).
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod checkpoint;
mod config;
mod errors;
mod evaluator;
mod problem;
mod search;

pub use checkpoint::*;
pub use config::*;
pub use errors::*;
pub use evaluator::*;
pub use problem::*;
pub use search::*;
