use std::sync::Arc;

/// Optional shared callback, cheap to clone across worker threads.
pub enum SharedFn<F: ?Sized + Send + Sync + 'static> {
    None,
    Some(Arc<F>),
}

impl<F: ?Sized + Send + Sync + 'static> SharedFn<F> {
    pub fn new(f: Arc<F>) -> Self {
        SharedFn::Some(f)
    }

    pub fn is_some(&self) -> bool {
        matches!(self, SharedFn::Some(_))
    }

    pub fn as_ref(&self) -> Option<&Arc<F>> {
        match self {
            SharedFn::None => None,
            SharedFn::Some(f) => Some(f),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Clone for SharedFn<F> {
    fn clone(&self) -> Self {
        match self {
            SharedFn::None => SharedFn::None,
            SharedFn::Some(f) => SharedFn::Some(Arc::clone(f)),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for SharedFn<F> {
    fn default() -> Self {
        SharedFn::None
    }
}

impl<F: ?Sized + Send + Sync + 'static> std::fmt::Debug for SharedFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_some() {
            "SharedFn::Some(..)"
        } else {
            "SharedFn::None"
        })
    }
}

impl<F: ?Sized + Send + Sync + 'static> From<Arc<F>> for SharedFn<F> {
    fn from(f: Arc<F>) -> Self {
        SharedFn::Some(f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn clones_share_the_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let f: SharedFn<dyn Fn(usize) + Send + Sync> = SharedFn::new(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::Relaxed);
        }));

        let g = f.clone();
        (f.as_ref().unwrap())(2);
        (g.as_ref().unwrap())(3);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn default_is_none() {
        let f: SharedFn<dyn Fn() + Send + Sync> = SharedFn::default();
        assert!(f.as_ref().is_none());
        assert_eq!(format!("{f:?}"), "SharedFn::None");
    }
}
