//! Loss functions.

use std::fmt;
use std::str::FromStr;

use ag_tensor::prelude::*;
use serde::{Deserialize, Serialize};

/// How element-wise losses are combined into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
    /// Keep the element-wise losses.
    None,
}

impl Reduction {
    fn apply(self, losses: Tensor) -> Result<Tensor> {
        match self {
            Reduction::Mean => losses.mean(None, false),
            Reduction::Sum => losses.sum(None, false),
            Reduction::None => Ok(losses),
        }
    }
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            "none" => Ok(Reduction::None),
            other => Err(Error::Configuration(format!(
                "{} is not a valid value for reduction",
                other
            ))),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reduction::Mean => "mean",
            Reduction::Sum => "sum",
            Reduction::None => "none",
        };
        f.write_str(s)
    }
}

/// Mean Squared Error: reduce((pred - target)^2)
pub fn mse_loss(pred: &Tensor, target: &Tensor, reduction: Reduction) -> Result<Tensor> {
    let diff = pred.sub(target)?;
    reduction.apply(diff.pow(2.0))
}

/// Squared L2 error between each element of the input and the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MseLoss {
    #[serde(default)]
    pub reduction: Reduction,
}

impl MseLoss {
    pub fn new(reduction: Reduction) -> Self {
        MseLoss { reduction }
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor) -> Result<Tensor> {
        mse_loss(input, target, self.reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Tensor, Tensor) {
        let input = Tensor::new([[1.0, 2.0, 3.0, 4.0, 5.0], [6.0, 7.0, 8.0, 9.0, 10.0]], true);
        let target = Tensor::new([[6.0, 7.0, 8.0, 9.0, 10.0], [1.0, 2.0, 3.0, 4.0, 5.0]], false);
        (input, target)
    }

    #[test]
    fn test_mse_mean() {
        let (input, target) = pair();
        let loss = MseLoss::default().forward(&input, &target).unwrap();
        assert_eq!(loss.item().unwrap(), 25.0);
    }

    #[test]
    fn test_mse_sum_and_none() {
        let (input, target) = pair();
        let sum = MseLoss::new(Reduction::Sum).forward(&input, &target).unwrap();
        assert_eq!(sum.item().unwrap(), 250.0);

        let none = MseLoss::new(Reduction::None).forward(&input, &target).unwrap();
        assert_eq!(none.shape().dims(), &[2, 5]);
        assert!(none.to_vec().iter().all(|&v| v == 25.0));
    }

    #[test]
    fn test_mse_gradient() {
        let (input, target) = pair();
        MseLoss::default()
            .forward(&input, &target)
            .unwrap()
            .backward(None)
            .unwrap();
        // d/dx mean((x - t)^2) = 2 (x - t) / n
        let g = input.grad().unwrap().to_vec();
        approx::assert_relative_eq!(g[0], -1.0);
        approx::assert_relative_eq!(g[5], 1.0);
    }

    #[test]
    fn test_reduction_parse() {
        assert_eq!("sum".parse::<Reduction>().unwrap(), Reduction::Sum);
        assert_eq!("none".parse::<Reduction>().unwrap(), Reduction::None);
        assert!(matches!(
            "avg".parse::<Reduction>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_config_deserialize() {
        let loss: MseLoss = serde_json::from_str(r#"{"reduction": "sum"}"#).unwrap();
        assert_eq!(loss.reduction, Reduction::Sum);
        let default: MseLoss = serde_json::from_str("{}").unwrap();
        assert_eq!(default.reduction, Reduction::Mean);
    }
}
