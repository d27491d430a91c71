//! The fixed order of layout transitions and passes recorded into every frame.
//!
//! Each pass states the layouts it expects in [`FramePass::required_layouts`]. The renderer walks
//! [`FRAME_SCRIPT`] front to back, so every transition and pass appears in exactly one place.
use kgal::ash::vk;

/// Images touched while recording a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameImage {
    /// Offscreen colour target everything is drawn into
    Draw,
    Depth,
    /// The acquired swapchain image
    Swapchain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePass {
    /// Compute gradient written into the draw image
    Background,
    /// Indexed mesh draws on top of the background
    Geometry,
    /// Copy of the draw image into the swapchain image
    Blit,
}

impl FramePass {
    /// Layouts the pass's images must be in when it is recorded
    pub fn required_layouts(&self) -> &'static [(FrameImage, vk::ImageLayout)] {
        match self {
            FramePass::Background => &[(FrameImage::Draw, vk::ImageLayout::GENERAL)],
            FramePass::Geometry => &[
                (FrameImage::Draw, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                (FrameImage::Depth, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL),
            ],
            FramePass::Blit => &[
                (FrameImage::Draw, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                (FrameImage::Swapchain, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Transition {
        image: FrameImage,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
    Pass(FramePass),
}

const fn transition(image: FrameImage, from: vk::ImageLayout, to: vk::ImageLayout) -> FrameStep {
    FrameStep::Transition { image, from, to }
}

/// Everything recorded between begin and end of a frame's command buffer
pub const FRAME_SCRIPT: &[FrameStep] = &[
    transition(
        FrameImage::Draw,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
    ),
    FrameStep::Pass(FramePass::Background),
    transition(
        FrameImage::Draw,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    ),
    transition(
        FrameImage::Depth,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    ),
    FrameStep::Pass(FramePass::Geometry),
    transition(
        FrameImage::Draw,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    ),
    transition(
        FrameImage::Swapchain,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    ),
    FrameStep::Pass(FramePass::Blit),
    transition(
        FrameImage::Swapchain,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ),
];

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    /// Replays the script, returning the final layout of each image
    fn replay(script: &[FrameStep]) -> HashMap<FrameImage, vk::ImageLayout> {
        let mut layouts: HashMap<FrameImage, vk::ImageLayout> = HashMap::new();
        for step in script {
            match *step {
                FrameStep::Transition { image, from, to } => {
                    let current = layouts
                        .get(&image)
                        .copied()
                        .unwrap_or(vk::ImageLayout::UNDEFINED);
                    assert!(
                        from == vk::ImageLayout::UNDEFINED || from == current,
                        "{image:?} moves from {from:?} while in {current:?}"
                    );
                    layouts.insert(image, to);
                }
                FrameStep::Pass(pass) => {
                    for (image, layout) in pass.required_layouts() {
                        assert_eq!(layouts.get(image), Some(layout), "{pass:?} on {image:?}");
                    }
                }
            }
        }
        layouts
    }

    #[test]
    fn every_pass_sees_the_layouts_it_needs() {
        let layouts = replay(FRAME_SCRIPT);
        assert_eq!(
            layouts.get(&FrameImage::Swapchain),
            Some(&vk::ImageLayout::PRESENT_SRC_KHR)
        );
    }

    #[test]
    fn passes_run_background_geometry_blit() {
        let passes: Vec<FramePass> = FRAME_SCRIPT
            .iter()
            .filter_map(|step| match step {
                FrameStep::Pass(pass) => Some(*pass),
                _ => None,
            })
            .collect();
        assert_eq!(
            passes,
            vec![FramePass::Background, FramePass::Geometry, FramePass::Blit]
        );
    }

    #[test]
    fn draw_image_transitions_follow_the_documented_order() {
        let draw: Vec<(vk::ImageLayout, vk::ImageLayout)> = FRAME_SCRIPT
            .iter()
            .filter_map(|step| match *step {
                FrameStep::Transition {
                    image: FrameImage::Draw,
                    from,
                    to,
                } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            draw,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL),
                (
                    vk::ImageLayout::GENERAL,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                ),
                (
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL
                ),
            ]
        );
    }

    #[test]
    #[should_panic]
    fn out_of_order_scripts_are_caught() {
        replay(&[
            FrameStep::Pass(FramePass::Blit),
            transition(
                FrameImage::Draw,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ),
        ]);
    }
}
