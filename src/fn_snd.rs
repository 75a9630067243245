// This is a lot of machinery just to call a function :-\
pub struct FnSnd<F>(pub F);

impl<T, F : FnMut(T)> super::sender::Sender<T> for FnSnd<F> {
  type SendError = std::convert::Infallible;

  fn send(&mut self, t : T) -> Result<(), Self::SendError> {
    (self.0)(t);
    Ok(())
  }
}
