/// Individual provider for a number of indistinguishable resources.
///
/// A pool only reports and accepts figures; deciding how much demand to request
/// is left to whoever drives the pool.
pub trait Pool: Send + Sync {
    /// The volume of resources that is provided by this pool.
    fn supply(&self) -> f64;

    /// The volume of resources to be provided by this pool.
    fn demand(&self) -> f64;

    /// Request a new volume of resources from this pool.
    fn set_demand(&self, value: f64);

    /// Fraction of the provided resources which is actively used.
    fn utilisation(&self) -> f64;

    /// Fraction of the provided resources which is assigned for usage.
    fn consumption(&self) -> f64;
}
