//! `ag` - command-line demos for the ag autograd engine.
//!
//! # Usage
//!
//! ```bash
//! # Compare backward-pass gradients against finite differences
//! ag gradcheck
//!
//! # Fit y = x @ [1, 3, 2] + 5 with a linear layer
//! ag train --epochs 200 --lr 0.05 --batch-size 16
//!
//! # Show per-node engine events
//! ag -vv gradcheck
//! ```

use std::process::ExitCode;

use ag_nn::{
    collate, DataLoader, Dataset, Linear, Module, MseLoss, Optimizer, Reduction, Sgd, SgdConfig,
    TensorDataset,
};
use ag_tensor::finite_diff::gradcheck;
use ag_tensor::prelude::*;
use ag_tensor::Array;
use clap::{Parser, Subcommand};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ag", version, about = "Reverse-mode autograd demos")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check autodiff gradients of demo expressions against finite differences
    Gradcheck {
        /// Finite difference step
        #[arg(long, default_value_t = 1e-6)]
        eps: f64,

        /// Largest accepted absolute error
        #[arg(long, default_value_t = 1e-5)]
        tolerance: f64,
    },

    /// Train a linear regression model on synthetic data
    Train {
        #[arg(long, default_value_t = 200)]
        epochs: usize,

        #[arg(long, default_value_t = 0.05)]
        lr: f64,

        #[arg(long, default_value_t = 0.0)]
        momentum: f64,

        #[arg(long, default_value_t = 16)]
        batch_size: usize,

        /// Number of training samples
        #[arg(long, default_value_t = 100)]
        samples: usize,

        /// Loss reduction: mean, sum or none
        #[arg(long, default_value = "mean")]
        reduction: String,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Gradcheck { eps, tolerance } => run_gradcheck(eps, tolerance),
        Command::Train {
            epochs,
            lr,
            momentum,
            batch_size,
            samples,
            reduction,
            seed,
        } => run_train(TrainArgs {
            epochs,
            config: SgdConfig::new(lr).with_momentum(momentum),
            batch_size,
            samples,
            reduction,
            seed,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// gradcheck
// ============================================================================

type DemoFn = fn(&[Tensor]) -> Result<Tensor>;

/// z = (x * y + exp(x)) / (y + 2), summed
fn rational(t: &[Tensor]) -> Result<Tensor> {
    let num = t[0].mul(&t[1])?.add(&t[0].exp())?;
    num.div(&t[1].add(2.0)?)?.sum(None, false)
}

/// z = (x + y) * (x - y), a diamond over both inputs
fn diamond(t: &[Tensor]) -> Result<Tensor> {
    let a = t[0].add(&t[1])?;
    let b = t[0].sub(&t[1])?;
    a.mul(&b)?.sum(None, false)
}

/// z = mean(relu(x @ w + b)^2)
fn layer(t: &[Tensor]) -> Result<Tensor> {
    t[0].matmul(&t[1])?.add(&t[2])?.relu().pow(2.0).mean(None, false)
}

/// z = sum(x / mean(x, axis 1) - x^T @ x) with broadcasting and a shared operand
fn reductions(t: &[Tensor]) -> Result<Tensor> {
    let row_means = t[0].mean(Some(&[1]), true)?;
    let normalized = t[0].div(&row_means)?.sum(None, false)?;
    let gram = t[0].t().matmul(&t[0])?.sum(None, false)?;
    normalized.sub(&gram)
}

fn run_gradcheck(eps: f64, tolerance: f64) -> std::result::Result<(), String> {
    let demos: Vec<(&str, DemoFn, Vec<Array>)> = vec![
        (
            "(x*y + exp(x)) / (y + 2)",
            rational as DemoFn,
            vec![
                Array1::from(vec![1.5, -0.3, 0.8]).into_dyn(),
                Array1::from(vec![2.5, 1.0, -0.5]).into_dyn(),
            ],
        ),
        (
            "(x + y) * (x - y)",
            diamond as DemoFn,
            vec![Array1::from(vec![3.0]).into_dyn(), Array1::from(vec![2.0]).into_dyn()],
        ),
        (
            "mean(relu(x @ w + b)^2)",
            layer as DemoFn,
            vec![
                Array2::from_shape_vec((2, 3), vec![0.5, -1.0, 2.0, 1.5, 0.3, -0.7])
                    .map_err(|e| e.to_string())?
                    .into_dyn(),
                Array2::from_shape_vec((3, 2), vec![0.4, -0.2, 0.1, 0.9, -0.3, 0.6])
                    .map_err(|e| e.to_string())?
                    .into_dyn(),
                Array1::from(vec![0.25, 0.5]).into_dyn(),
            ],
        ),
        (
            "sum(x / mean(x, 1) - x^T @ x)",
            reductions as DemoFn,
            vec![Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 5.0])
                .map_err(|e| e.to_string())?
                .into_dyn()],
        ),
    ];

    println!("=== Gradient Check (eps = {:.0e}) ===\n", eps);
    let mut worst: f64 = 0.0;
    for (name, f, inputs) in &demos {
        let err = gradcheck(f, inputs, eps).map_err(|e| e.to_string())?;
        let status = if err < tolerance { "ok" } else { "FAIL" };
        println!("  {:<32} max |autodiff - fd| = {:.2e}  {}", name, err, status);
        worst = worst.max(err);
    }

    println!();
    if worst < tolerance {
        println!("PASS: max error ({:.2e}) < tolerance ({:.2e})", worst, tolerance);
        Ok(())
    } else {
        Err(format!(
            "max error ({:.2e}) >= tolerance ({:.2e})",
            worst, tolerance
        ))
    }
}

// ============================================================================
// train
// ============================================================================

struct TrainArgs {
    epochs: usize,
    config: SgdConfig,
    batch_size: usize,
    samples: usize,
    reduction: String,
    seed: u64,
}

/// `y = x @ coef + 5` on uniform inputs in [0, 1).
fn synthetic_data(n: usize, coef: &Array1<f64>, rng: &mut StdRng) -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_simple_fn((n, coef.len()), || rng.gen::<f64>());
    let y = (x.dot(coef) + 5.0).insert_axis(Axis(1));
    (x, y)
}

fn run_train(args: TrainArgs) -> std::result::Result<(), String> {
    let reduction: Reduction = args.reduction.parse().map_err(|e: Error| e.to_string())?;
    if reduction == Reduction::None {
        return Err("training needs a scalar loss; use --reduction mean or sum".to_string());
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let coef = Array1::from(vec![1.0, 3.0, 2.0]);
    let (x_train, y_train) = synthetic_data(args.samples, &coef, &mut rng);
    let (x_test, y_test) = synthetic_data(args.samples / 5 + 1, &coef, &mut rng);

    let dataset = TensorDataset::new(x_train.into_dyn(), y_train.into_dyn()).map_err(|e| e.to_string())?;
    let loader = DataLoader::new(&dataset, args.batch_size, false).map_err(|e| e.to_string())?;

    let model = Linear::with_rng(coef.len(), 1, true, &mut rng);
    let mut opt = Sgd::new(model.parameters(), args.config).map_err(|e| e.to_string())?;
    let loss_fn = MseLoss::new(reduction);

    println!(
        "=== Training Linear({} -> 1) on {} samples, {} batches/epoch ===\n",
        coef.len(),
        dataset.len(),
        loader.len()
    );

    let report_every = (args.epochs / 10).max(1);
    for epoch in 0..args.epochs {
        let mut total = 0.0;
        for batch in loader.iter() {
            let (xs, ys): (Vec<Array>, Vec<Array>) = batch.into_iter().unzip();
            let x = collate(&xs).map_err(|e| e.to_string())?;
            let y = collate(&ys).map_err(|e| e.to_string())?;

            opt.zero_grad();
            let loss = model
                .forward(&x)
                .and_then(|pred| loss_fn.forward(&pred, &y))
                .map_err(|e| e.to_string())?;
            loss.backward(None).map_err(|e| e.to_string())?;
            opt.step().map_err(|e| e.to_string())?;
            total += loss.item().map_err(|e| e.to_string())?;
        }

        tracing::debug!(epoch, loss = total, "epoch finished");
        if epoch % report_every == 0 || epoch + 1 == args.epochs {
            println!("Epoch {:4}: avg loss = {:.6}", epoch, total / loader.len().max(1) as f64);
        }
    }

    let x_test = Tensor::new(x_test, false);
    let y_test = Tensor::new(y_test, false);
    let test_loss = model
        .forward(&x_test)
        .and_then(|pred| MseLoss::default().forward(&pred, &y_test))
        .and_then(|l| l.item())
        .map_err(|e| e.to_string())?;

    println!("\nTest MSE: {:.6}", test_loss);
    println!("Learned weight: {:?}  (target [1, 3, 2])", model.weight.to_vec());
    if let Some(bias) = &model.bias {
        println!("Learned bias:   {:?}  (target [5])", bias.to_vec());
    }
    Ok(())
}
