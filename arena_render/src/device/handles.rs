//! Opaque device object handles
//!
//! Every object the device creates is referred to by a 64-bit handle. The
//! driver decides what the value means; zero is never a live object.

macro_rules! define_handles {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(pub u64);

            impl $name {
                /// Handle that refers to no object
                pub const NULL: Self = Self(0);

                pub fn is_null(self) -> bool {
                    self.0 == 0
                }

                pub fn raw(self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

define_handles! {
    /// Device image (texture, attachment or swapchain image)
    ImageHandle;
    /// View over an image
    ImageViewHandle;
    /// Raw device memory allocation (image chunks)
    MemoryHandle;
    /// Host-visible buffer
    BufferHandle;
    SamplerHandle;
    ShaderModuleHandle;
    DescriptorSetLayoutHandle;
    DescriptorPoolHandle;
    DescriptorSetHandle;
    PipelineLayoutHandle;
    RenderPassHandle;
    FramebufferHandle;
    /// Compiled graphics pipeline
    PipelineHandle;
    FenceHandle;
    SemaphoreHandle;
    CommandBufferHandle;
    SwapchainHandle;
}
