use chrono::NaiveDateTime;

/// A cacheable domain record: a stable string identity plus the timestamp
/// used to order it.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn date(&self) -> NaiveDateTime;

    /// Assigns an identity to a record that was built without one.
    ///
    /// Only used before the record is first submitted; identity never
    /// changes after creation.
    fn set_id(&mut self, id: String);

    /// Brings `date` into its canonical form after it arrives from the server.
    fn normalize_date(&mut self);
}
