// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Coarse classification of a [`RenderError`]. Every kind is fatal for the
/// renderer; the kind only tells the caller what went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NoCompatibleDevice,
    IncompleteQueueFamilies,
    UnsupportedQueueTopology,
    ExtensionOrFormatUnsupported,
    ResourceCreationFailure,
    SynchronizationWaitFailure,
    FrameSubmissionFailure,
    WindowSystem,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no Vulkan physical devices found")]
    NoDevices,

    #[error("none of the {0} physical device(s) can render and present to this surface")]
    NoSuitableDevice(usize),

    #[error("queue families incomplete (graphics={graphics:?}, present={present:?})")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error(
        "graphics queue family {graphics} differs from present queue family {present}; \
         separate families are not supported"
    )]
    UnsupportedQueueTopology { graphics: u32, present: u32 },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{op} failed: {result:?}")]
    Creation {
        op: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("no device-local memory type matches type bits {type_bits:#b}")]
    NoDeviceLocalMemory { type_bits: u32 },

    #[error(
        "swapchain chain lengths differ: images={images} views={views} \
         framebuffers={framebuffers} command_buffers={command_buffers}"
    )]
    ChainMismatch {
        images: usize,
        views: usize,
        framebuffers: usize,
        command_buffers: usize,
    },

    #[error("shader bytecode invalid: {0}")]
    Shader(#[from] std::io::Error),

    #[error("{op} failed: {result:?}")]
    Wait {
        op: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("{op} failed: {result:?}")]
    Submission {
        op: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("acquired image {index} has no command buffer ({count} recorded)")]
    ImageOutOfRange { index: u32, count: usize },

    #[error("window system handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::NoDevices | RenderError::NoSuitableDevice(_) => {
                ErrorKind::NoCompatibleDevice
            }
            RenderError::IncompleteQueueFamilies { .. } => ErrorKind::IncompleteQueueFamilies,
            RenderError::UnsupportedQueueTopology { .. } => ErrorKind::UnsupportedQueueTopology,
            RenderError::Unsupported(_) => ErrorKind::ExtensionOrFormatUnsupported,
            RenderError::Creation { .. }
            | RenderError::NoDeviceLocalMemory { .. }
            | RenderError::ChainMismatch { .. }
            | RenderError::Shader(_) => ErrorKind::ResourceCreationFailure,
            RenderError::Wait { .. } => ErrorKind::SynchronizationWaitFailure,
            RenderError::Submission { .. } | RenderError::ImageOutOfRange { .. } => {
                ErrorKind::FrameSubmissionFailure
            }
            RenderError::WindowHandle(_) => ErrorKind::WindowSystem,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Attaches the failing operation name to raw `vk::Result` errors.
pub(crate) trait VkContext<T> {
    fn creating(self, op: &'static str) -> RenderResult<T>;
    fn waiting(self, op: &'static str) -> RenderResult<T>;
    fn submitting(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkContext<T> for Result<T, vk::Result> {
    fn creating(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Creation { op, result })
    }

    fn waiting(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Wait { op, result })
    }

    fn submitting(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Submission { op, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(RenderError::NoDevices.kind(), ErrorKind::NoCompatibleDevice);
        assert_eq!(
            RenderError::NoSuitableDevice(3).kind(),
            ErrorKind::NoCompatibleDevice
        );
        assert_eq!(
            RenderError::UnsupportedQueueTopology {
                graphics: 0,
                present: 1
            }
            .kind(),
            ErrorKind::UnsupportedQueueTopology
        );
        assert_eq!(
            RenderError::NoDeviceLocalMemory { type_bits: 0 }.kind(),
            ErrorKind::ResourceCreationFailure
        );
    }

    #[test]
    fn context_names_the_operation() {
        let r: Result<(), vk::Result> = Err(vk::Result::TIMEOUT);
        let err = r.waiting("wait_for_fences").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SynchronizationWaitFailure);
        assert!(err.to_string().starts_with("wait_for_fences failed"));

        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = r.creating("create_image").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreationFailure);

        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let err = r.submitting("queue_present").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FrameSubmissionFailure);
    }
}
