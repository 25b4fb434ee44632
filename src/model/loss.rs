use burn::prelude::*;

/// Multi-scale loss fusion over the seven side outputs.
pub struct FusionLoss;

impl FusionLoss {
    /// Returns `(loss0, total)`: the primary-scale L1 loss for reporting
    /// and the weighted sum driving the gradient step.
    ///
    /// `total = loss0/2 + loss1/3 + ... + loss6/8 + l1(d0, label)`.
    /// The trailing unweighted term repeats the primary loss on purpose;
    /// the original training recipe double-counts the finest output and
    /// that arithmetic is kept as-is.
    pub fn fuse<B: Backend>(
        outputs: &[Tensor<B, 4>; 7],
        labels: Tensor<B, 4>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let losses: Vec<Tensor<B, 1>> = outputs
            .iter()
            .map(|d| Self::l1(d.clone(), labels.clone()))
            .collect();
        let aggregate_extra = Self::l1(outputs[0].clone(), labels);

        let mut total = losses[0].clone() / 2.0;
        for (i, loss) in losses.iter().enumerate().skip(1) {
            total = total + loss.clone() / (i as f32 + 2.0);
        }
        total = total + aggregate_extra;

        (losses[0].clone(), total)
    }

    /// Mean absolute difference.
    fn l1<B: Backend>(pred: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (pred - target).abs().mean()
    }
}
