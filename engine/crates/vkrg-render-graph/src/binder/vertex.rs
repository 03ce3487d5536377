//! 从 vertex shader 的输入推导顶点输入的 binding 与 attribute
//!
//! 每个输入使用独立的 binding（非交错的顶点 buffer），binding 下标按照 location 排序。
//! 矩阵按列拆分为多个 attribute，占用连续的 location。

use ash::vk;
use itertools::Itertools;
use vkrg_shader::reflection::{ReflBaseType, ReflFieldType, ReflInput, ShaderModuleReflection};

fn sorted_inputs(reflection: &ShaderModuleReflection) -> Vec<&ReflInput> {
    reflection.inputs.iter().sorted_by_key(|input| input.location).collect()
}

/// 一列（或者一个向量）对应的顶点格式
fn column_format(ty: &ReflFieldType) -> vk::Format {
    use vk::Format as F;
    let formats = match (ty.base, ty.component_size) {
        (ReflBaseType::Float, 4) => [F::R32_SFLOAT, F::R32G32_SFLOAT, F::R32G32B32_SFLOAT, F::R32G32B32A32_SFLOAT],
        (ReflBaseType::Int, 4) => [F::R32_SINT, F::R32G32_SINT, F::R32G32B32_SINT, F::R32G32B32A32_SINT],
        (ReflBaseType::UInt, 4) => [F::R32_UINT, F::R32G32_UINT, F::R32G32B32_UINT, F::R32G32B32A32_UINT],
        (ReflBaseType::Double, 8) => [F::R64_SFLOAT, F::R64G64_SFLOAT, F::R64G64B64_SFLOAT, F::R64G64B64A64_SFLOAT],
        _ => {
            vkrg_crate_tools::rg_break!("unsupported vertex input type {:?}", ty);
            return F::UNDEFINED;
        }
    };
    match ty.vec_size {
        1..=4 => formats[ty.vec_size as usize - 1],
        _ => {
            vkrg_crate_tools::rg_break!("unsupported vertex input vector size {}", ty.vec_size);
            F::UNDEFINED
        }
    }
}

/// `instanced(name)` 为 true 的输入按 instance 读取
pub fn get_vertex_bindings(
    reflection: &ShaderModuleReflection,
    instanced: &dyn Fn(&str) -> bool,
) -> Vec<vk::VertexInputBindingDescription> {
    sorted_inputs(reflection)
        .into_iter()
        .enumerate()
        .map(|(binding, input)| vk::VertexInputBindingDescription {
            binding: binding as u32,
            stride: input.size(),
            input_rate: if instanced(&input.name) {
                vk::VertexInputRate::INSTANCE
            } else {
                vk::VertexInputRate::VERTEX
            },
        })
        .collect()
}

/// attribute 的 binding 与 [`get_vertex_bindings`] 一一对应
pub fn get_vertex_attributes(reflection: &ShaderModuleReflection) -> Vec<vk::VertexInputAttributeDescription> {
    let mut attributes = vec![];
    for (binding, input) in sorted_inputs(reflection).into_iter().enumerate() {
        let format = column_format(&input.ty);
        let column_size = input.ty.column_size();
        let column_count = input.ty.columns * input.array_size.max(1);
        for column in 0..column_count {
            attributes.push(vk::VertexInputAttributeDescription {
                location: input.location + column,
                binding: binding as u32,
                format,
                offset: column * column_size,
            });
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, location: u32, ty: ReflFieldType) -> ReflInput {
        ReflInput {
            name: name.to_string(),
            location,
            ty,
            array_size: 1,
        }
    }

    fn reflection() -> ShaderModuleReflection {
        ShaderModuleReflection {
            inputs: vec![
                input("instanceModel", 2, ReflFieldType::mat(4, 4)),
                input("position", 0, ReflFieldType::vec(ReflBaseType::Float, 3)),
                input("uv", 1, ReflFieldType::vec(ReflBaseType::Float, 2)),
                input("materialId", 6, ReflFieldType::scalar(ReflBaseType::UInt, 4)),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_bindings_sorted_by_location() {
        let instanced = |name: &str| name.starts_with("instance");
        let bindings = get_vertex_bindings(&reflection(), &instanced);
        assert_eq!(
            bindings.iter().map(|b| (b.binding, b.stride, b.input_rate)).collect::<Vec<_>>(),
            vec![
                (0, 12, vk::VertexInputRate::VERTEX),
                (1, 8, vk::VertexInputRate::VERTEX),
                (2, 64, vk::VertexInputRate::INSTANCE),
                (3, 4, vk::VertexInputRate::VERTEX),
            ]
        );
    }

    #[test]
    fn test_matrix_split_into_columns() {
        let attributes = get_vertex_attributes(&reflection());
        assert_eq!(
            attributes.iter().map(|a| (a.location, a.binding, a.format, a.offset)).collect::<Vec<_>>(),
            vec![
                (0, 0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, 1, vk::Format::R32G32_SFLOAT, 0),
                (2, 2, vk::Format::R32G32B32A32_SFLOAT, 0),
                (3, 2, vk::Format::R32G32B32A32_SFLOAT, 16),
                (4, 2, vk::Format::R32G32B32A32_SFLOAT, 32),
                (5, 2, vk::Format::R32G32B32A32_SFLOAT, 48),
                (6, 3, vk::Format::R32_UINT, 0),
            ]
        );
    }
}
