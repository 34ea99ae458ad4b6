// SPDX-License-Identifier: CEPL-1.0
use tracing::debug;

use crate::device::Device;
use crate::error::RenderResult;
use crate::layout::{ImageLayout, ImageResource};

/// Copies `staging` into `target` and leaves it ready for sampling.
///
/// Blocks until the copy has retired, so the caller may free `staging` as
/// soon as this returns. The target must still be in `Undefined`.
pub fn upload_image<D: Device>(
    device: &mut D,
    target: &mut ImageResource<D::Image>,
    staging: D::Buffer,
) -> RenderResult<()> {
    let cmd = device.allocate_command_buffers(1)?[0];
    let fence = match device.create_fence(false) {
        Ok(f) => f,
        Err(e) => {
            device.free_command_buffers(&[cmd]);
            return Err(e);
        }
    };

    let submitted = record_copy(device, cmd, target, staging)
        .and_then(|()| device.submit(cmd, None, None, Some(fence)));
    if let Err(e) = submitted {
        device.free_command_buffers(&[cmd]);
        device.destroy_fence(fence);
        return Err(e);
    }

    // Nothing is released on a failed wait: the copy may still be running.
    device.wait_fence(fence, u64::MAX)?;
    device.free_command_buffers(&[cmd]);
    device.destroy_fence(fence);
    debug!(extent = ?target.extent(), "uploaded image");
    Ok(())
}

fn record_copy<D: Device>(
    device: &mut D,
    cmd: D::CommandBuffer,
    target: &mut ImageResource<D::Image>,
    staging: D::Buffer,
) -> RenderResult<()> {
    device.begin_commands(cmd, true)?;
    target.transition(device, cmd, ImageLayout::TransferDst)?;
    device.cmd_copy_buffer_to_image(cmd, staging, target.image(), target.range(), target.extent());
    target.transition(device, cmd, ImageLayout::ShaderReadOnly)?;
    device.end_commands(cmd)
}
