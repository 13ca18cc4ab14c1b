//! Time-step fan-out, on the rayon pool when the `parallel` feature is on.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use surfwat_core::Result;

/// Run `f` for every time step in `0..time_steps` and collect the results
/// in time order, stopping at the first error.
pub(crate) fn try_map_time_steps<R, F>(time_steps: usize, f: F) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize) -> Result<R> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        (0..time_steps).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..time_steps).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surfwat_core::Error;

    #[test]
    fn test_results_keep_time_order() {
        let squares = try_map_time_steps(5, |t| Ok(t * t)).unwrap();
        assert_eq!(squares, vec![0, 1, 4, 9, 16]);
        assert!(try_map_time_steps(0, |t| Ok(t)).unwrap().is_empty());
    }

    #[test]
    fn test_error_is_returned() {
        let result = try_map_time_steps(4, |t| {
            if t == 2 {
                Err(Error::Algorithm("bad layer".into()))
            } else {
                Ok(t)
            }
        });
        assert!(matches!(result, Err(Error::Algorithm(_))));
    }
}
