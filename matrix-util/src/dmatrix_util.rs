use crate::traits::*;

pub use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand_distr::StandardNormal;
use rayon::prelude::*;

impl MatOps for DMatrix<f32> {
    type Mat = DMatrix<f32>;
    type Scalar = f32;

    fn centre_columns_inplace(&mut self) {
        for mut x_j in self.column_iter_mut() {
            let mean = x_j.mean();
            x_j.add_scalar_mut(-mean);
        }
    }

    fn centre_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }

    fn scale_columns_inplace(&mut self) {
        let denom = (self.nrows().max(2) - 1) as f32;
        for mut x_j in self.column_iter_mut() {
            let mean = x_j.mean();
            x_j.add_scalar_mut(-mean);
            let sd = (x_j.norm_squared() / denom).sqrt();
            if sd > 0.0 {
                x_j /= sd;
            }
        }
    }

    fn scale_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.scale_columns_inplace();
        ret
    }
}

impl SampleOps for DMatrix<f32> {
    type Mat = DMatrix<f32>;
    type Scalar = f32;

    fn runif(dd: usize, nn: usize) -> Self::Mat {
        let rvec = (0..(dd * nn))
            .into_par_iter()
            .map_init(rand::rng, |rng, _| rng.random::<f32>())
            .collect();

        DMatrix::<f32>::from_vec(dd, nn, rvec)
    }

    fn rnorm(dd: usize, nn: usize) -> Self::Mat {
        let rvec = (0..(dd * nn))
            .into_par_iter()
            .map_init(rand::rng, |rng, _| rng.sample(StandardNormal))
            .collect();

        DMatrix::<f32>::from_vec(dd, nn, rvec)
    }
}
