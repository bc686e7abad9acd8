/// Two copies of a resource: one is read while the other is written, and
/// `swap` flips their roles.
#[derive(Debug)]
pub struct PingPong<T> {
  slots: [T; 2],
  current: usize,
}

impl<T> PingPong<T> {
  pub fn new(first: T, second: T) -> Self {
    Self {
      slots: [first, second],
      current: 0,
    }
  }

  pub fn current(&self) -> &T {
    &self.slots[self.current]
  }

  pub fn next(&self) -> &T {
    &self.slots[1 - self.current]
  }

  pub fn next_mut(&mut self) -> &mut T {
    &mut self.slots[1 - self.current]
  }

  /// Borrows the read slot and the write slot at once.
  pub fn split(&mut self) -> (&T, &mut T) {
    let [a, b] = &mut self.slots;
    if self.current == 0 {
      (&*a, b)
    } else {
      (&*b, a)
    }
  }

  pub fn get(&self, index: usize) -> &T {
    &self.slots[index]
  }

  pub fn current_index(&self) -> usize {
    self.current
  }

  pub fn swap(&mut self) {
    self.current = 1 - self.current;
  }
}

impl<T: Clone> PingPong<T> {
  pub fn filled(value: T) -> Self {
    Self::new(value.clone(), value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn swap_alternates_slots() {
    let mut pp = PingPong::new("a", "b");
    assert_eq!(*pp.current(), "a");
    assert_eq!(*pp.next(), "b");
    pp.swap();
    assert_eq!(*pp.current(), "b");
    assert_eq!(pp.current_index(), 1);
    pp.swap();
    assert_eq!(*pp.current(), "a");
  }

  #[test]
  fn writes_land_in_the_back_buffer() {
    let mut pp = PingPong::filled(0);
    {
      let (read, write) = pp.split();
      *write = *read + 1;
    }
    assert_eq!(*pp.current(), 0);
    pp.swap();
    assert_eq!(*pp.current(), 1);
  }
}
