/*!
This library implements the search space used by model-based search: an ordered
list of named dimensions (continuous, integer or categorical) from which
configurations are sampled and into which they are encoded for surrogate fitting.

A continuous dimension may use a logarithmic scale, a categorical one may carry
sampling weights, and any numeric dimension may use a truncated normal prior
(see [`reshape_around`] which builds such priors from a good configuration).

Example:
```
use ambs_space::{Dimension, Scale, Space, Value};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

let space = Space::new(vec![
    Dimension::continuous("lr", 1e-5, 1e-1, Scale::Log).unwrap(),
    Dimension::integer("units", 16, 256).unwrap(),
    Dimension::categorical("activation", &["relu", "tanh", "sigmoid"]).unwrap(),
])
.unwrap();

let mut rng = Xoshiro256Plus::seed_from_u64(42);
let configs = space.sample(10, &mut rng);
// one-hot encoding of the categorical dimension gives 5 columns
let x = space.transform(&configs).unwrap();
assert_eq!(x.dim(), (10, 5));
let named = space.to_named(&configs[0]);
assert!(matches!(named["units"], Value::Int(_)));
```

Conditions and forbidden clauses are carried along the space as data, they are
not enforced while sampling.
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod conditions;
mod dimension;
mod errors;
mod reshape;
mod space;
mod value;

pub use conditions::*;
pub use dimension::*;
pub use errors::*;
pub use reshape::*;
pub use space::*;
pub use value::*;
