/// A clocked simulation component.
///
/// The current cycle is always passed in explicitly by the owner of the clock,
/// components never query a global time.
pub trait Component {
    fn cycle(&mut self, cycle: u64);
}
