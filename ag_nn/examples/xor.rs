//! XOR training example.
//!
//! Fits a 2 -> 16 -> 1 network with a sigmoid output to the XOR truth table.
//! XOR is not linearly separable, so the hidden layer is required.

use std::rc::Rc;

use ag_nn::{Linear, Module, ModuleRegistry, MseLoss, Optimizer, ReLU, Sgd, SgdConfig, Sigmoid};
use ag_tensor::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

struct XorNet {
    hidden: Rc<Linear>,
    act: Rc<ReLU>,
    out: Rc<Linear>,
    squash: Rc<Sigmoid>,
    registry: ModuleRegistry,
}

impl XorNet {
    fn new(rng: &mut StdRng) -> Self {
        let mut registry = ModuleRegistry::new();
        let hidden = registry.register_module("hidden", Linear::with_rng(2, 16, true, rng));
        let act = registry.register_module("act", ReLU::new());
        let out = registry.register_module("out", Linear::with_rng(16, 1, true, rng));
        let squash = registry.register_module("squash", Sigmoid::new());
        XorNet {
            hidden,
            act,
            out,
            squash,
            registry,
        }
    }
}

impl Module for XorNet {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let h = self.act.forward(&self.hidden.forward(input)?)?;
        self.squash.forward(&self.out.forward(&h)?)
    }

    fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

fn main() -> Result<()> {
    let x = Tensor::new([[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]], false);
    let y = Tensor::new([[0.0], [1.0], [1.0], [0.0]], false);

    let net = XorNet::new(&mut StdRng::seed_from_u64(3));
    let mut opt = Sgd::new(net.parameters(), SgdConfig::new(0.5).with_momentum(0.9))?;
    let loss_fn = MseLoss::default();

    println!("Training XOR network...\n");
    for epoch in 0..2000 {
        opt.zero_grad();
        let loss = loss_fn.forward(&net.forward(&x)?, &y)?;
        loss.backward(None)?;
        opt.step()?;

        if epoch % 200 == 0 || epoch == 1999 {
            println!("Epoch {:4}: loss = {:.6}", epoch, loss.item()?);
        }
    }

    println!("\nTesting trained network:");
    println!("========================");
    let pred = net.forward(&x)?.to_vec();
    let inputs = x.to_vec();
    let targets = y.to_vec();

    let mut correct = 0;
    for (i, (&output, &target)) in pred.iter().zip(&targets).enumerate() {
        println!(
            "Input: [{:.0}, {:.0}] -> Output: {:.4} (target: {:.0})",
            inputs[2 * i],
            inputs[2 * i + 1],
            output,
            target
        );
        let class = if output > 0.5 { 1.0 } else { 0.0 };
        if class == target {
            correct += 1;
        }
    }

    println!("\nAccuracy: {}/4", correct);
    Ok(())
}
