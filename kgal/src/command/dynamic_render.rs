use ash::vk;

use crate::device::Device;

/// Contains the attachments of a dynamic rendering pass recorded into a borrowed command buffer
#[derive(Debug)]
pub struct DynamicRenderContext<'a, D: Device> {
    cmd: &'a crate::command::CommandBufferRecording<D>,
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl<'a, D: Device> DynamicRenderContext<'a, D> {
    pub(crate) fn from_recording(cmd: &'a crate::command::CommandBufferRecording<D>) -> Self {
        Self {
            cmd,
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    /// Pushes an image view as a color attachment. [`None`] loads the existing contents.
    pub fn push_image_as_color_attachment(
        mut self,
        image_layout: vk::ImageLayout,
        image_view: vk::ImageView,
        clear_value: Option<vk::ClearValue>,
    ) -> Self {
        self.color_attachments.push(
            vk::RenderingAttachmentInfo::default()
                .image_view(image_view)
                .image_layout(image_layout)
                .load_op(match clear_value {
                    None => vk::AttachmentLoadOp::LOAD,
                    Some(_) => vk::AttachmentLoadOp::CLEAR,
                })
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value.unwrap_or_default()),
        );
        self
    }

    /// Sets the depth attachment, cleared to `clear_depth`
    pub fn depth_attachment(
        mut self,
        image_layout: vk::ImageLayout,
        image_view: vk::ImageView,
        clear_depth: f32,
    ) -> Self {
        self.depth_attachment = Some(
            vk::RenderingAttachmentInfo::default()
                .image_view(image_view)
                .image_layout(image_layout)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: clear_depth,
                        stencil: 0,
                    },
                }),
        );
        self
    }

    /// Begins rendering
    pub fn begin_rendering(self, extent: vk::Extent2D) -> Self {
        let mut render_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        if let Some(depth) = self.depth_attachment.as_ref() {
            render_info = render_info.depth_attachment(depth);
        }
        self.cmd
            .get_device()
            .cmd_begin_rendering(self.cmd.handle(), &render_info);
        self
    }

    /// Ends rendering
    pub fn end_rendering(self) {
        self.cmd.get_device().cmd_end_rendering(self.cmd.handle());
    }
}
