use std::fmt;

/// Lower-cases a type name and strips a leading namespace separator, so that
/// `\App\Engine`, `app\engine` and `App\Engine` share one registry key.
pub fn normalize_name(name: &str) -> String {
  name.trim().trim_start_matches('\\').to_lowercase()
}

/// A value tagged with the type name it was registered under, in the casing
/// the caller used.
pub struct Named<T> {
  pub name: String,
  pub value: T,
}

impl<T> Named<T> {
  pub fn new(name: impl Into<String>, value: T) -> Self {
    Named {
      name: name.into(),
      value,
    }
  }
}

impl<T> fmt::Debug for Named<T>
  where T: fmt::Debug
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Named")
      .field("name", &self.name)
      .field("value", &self.value)
      .finish()
  }
}

impl<T> Clone for Named<T>
  where T: Clone
{
  fn clone(&self) -> Self {
    Named {
      name: self.name.clone(),
      value: self.value.clone(),
    }
  }
}
