pub mod reconcile;

pub use reconcile::Reconciler;
