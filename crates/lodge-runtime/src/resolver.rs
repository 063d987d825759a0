use lodge_core::{Descriptor, TargetInfo};

/// Maps a descriptor to the concrete implementation that would run it.
///
/// `None` means nothing can handle the descriptor.
pub trait Resolver: Send + Sync {
    fn resolve(&self, descriptor: &Descriptor) -> Option<TargetInfo>;
}

impl<F> Resolver for F
where
    F: Fn(&Descriptor) -> Option<TargetInfo> + Send + Sync,
{
    fn resolve(&self, descriptor: &Descriptor) -> Option<TargetInfo> {
        self(descriptor)
    }
}
