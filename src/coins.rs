//! Read-only view of unspent outputs

use crate::types::*;

/// Source of unspent outputs consulted during validation. Validation only
/// reads from a view; applying spends is the caller's business.
pub trait CoinView {
    /// The unspent output at `outpoint`, if any
    fn access_coin(&self, outpoint: &OutPoint) -> Option<&Coin>;

    /// True if every input of `tx` refers to an unspent output
    fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.inputs
            .iter()
            .all(|input| self.access_coin(&input.prevout).is_some())
    }
}

impl CoinView for UtxoSet {
    fn access_coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.get(outpoint)
    }
}

impl<V: CoinView + ?Sized> CoinView for &V {
    fn access_coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        (**self).access_coin(outpoint)
    }
}
