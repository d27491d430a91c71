use std::borrow::Cow;
use std::ffi::CStr;

use anyhow::Result;
use ash::vk;
use derivative::Derivative;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::traits::Destructible;

/// Represents a [`VkDebugUtilsMessengerEXT`](ash::ext::debug_utils) which forwards validation
/// output into [`tracing`]
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct DebugMessenger {
    handle: vk::DebugUtilsMessengerEXT,
    #[derivative(Debug = "ignore")]
    ext: ash::ext::debug_utils::Instance,
}

impl DebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let ext = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vk_debug_callback));
        let handle = unsafe { ext.create_debug_utils_messenger(&debug_ci, None)? };

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkDebugUtilsMessenger {:?}", handle);

        Ok(Self { handle, ext })
    }

    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.handle
    }
}

impl Destructible for DebugMessenger {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkDebugUtilsMessenger {:?}", self.handle);

        unsafe { self.ext.destroy_debug_utils_messenger(self.handle, None) }
    }
}

fn lossy(ptr: *const std::os::raw::c_char) -> Cow<'static, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        Cow::Owned(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// the callback function used in Debug Utils.
unsafe extern "system" fn vk_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    msg_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { *p_callback_data };
    let message_id_number = callback_data.message_id_number;
    let message_id_name = lossy(callback_data.p_message_id_name);
    let message = lossy(callback_data.p_message);

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(
                "[{:?}]: {} ({}): {}",
                msg_type, message_id_name, message_id_number, message
            );
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(
                "[{:?}]: {} ({}): {}",
                msg_type, message_id_name, message_id_number, message
            );
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(
                "[{:?}]: {} ({}): {}",
                msg_type, message_id_name, message_id_number, message
            );
        }
        _ => {
            tracing::error!(
                "[{:?}]: {} ({}): {}",
                msg_type, message_id_name, message_id_number, message
            );
        }
    };

    vk::FALSE
}
