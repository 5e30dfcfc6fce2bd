mod common;

use common::{ClassDataDef, ClassDefDef, CodeDef, DexBuilder, FieldDef, MethodDef};
use dexview::file::{
    AlignedImage, DexFile, DexLocation, EncodedValue, InvokeType, ACC_PUBLIC, ACC_STATIC,
};

/// One class `Lp/C;` with a static int field `x = 7` and a direct method
/// `void m()` holding a single return-void instruction.
fn one_class_image() -> Vec<u8> {
    let mut builder = DexBuilder::new();
    let s_int = builder.string("I"); // 0
    let s_c = builder.string("Lp/C;"); // 1
    let s_void = builder.string("V"); // 2
    let s_m = builder.string("m"); // 3
    let s_x = builder.string("x"); // 4

    let t_int = builder.type_id(s_int); // 0
    let t_c = builder.type_id(s_c); // 1
    let t_void = builder.type_id(s_void); // 2

    let p_v = builder.proto(s_void, t_void, &[]);
    let f_x = builder.field(t_c, t_int, s_x);
    let m_m = builder.method(t_c, p_v, s_m);

    builder.class(ClassDefDef {
        class_idx: t_c,
        access_flags: ACC_PUBLIC,
        class_data: Some(ClassDataDef {
            static_fields: vec![FieldDef {
                field_idx: f_x,
                access_flags: ACC_STATIC | ACC_PUBLIC,
            }],
            direct_methods: vec![MethodDef {
                method_idx: m_m,
                access_flags: ACC_STATIC | ACC_PUBLIC,
                code: Some(CodeDef {
                    registers_size: 1,
                    ins_size: 0,
                    outs_size: 0,
                    insns: vec![0x000E], // return-void
                    ..Default::default()
                }),
            }],
            ..Default::default()
        }),
        // encoded_array of size 1: Int(7)
        static_values: Some(vec![0x01, 0x04, 0x07]),
        ..Default::default()
    });
    builder.build()
}

#[test]
fn test_one_class_scenario() {
    let bytes = one_class_image();
    let image = AlignedImage::new(&bytes);
    let dex = DexFile::from_raw_parts(&image, DexLocation::InMemory).unwrap();

    let class_def = dex.find_class_def("Lp/C;").expect("class not found");
    let accessor = dex.get_class_accessor(class_def).unwrap().expect("class data");

    assert_eq!(accessor.num_static_fields, 1);
    assert_eq!(accessor.num_instance_fields, 0);
    assert_eq!(accessor.num_direct_methods, 1);
    assert_eq!(accessor.num_virtual_methods, 0);

    let fields: Vec<_> = accessor.get_fields().collect();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].index, 0);
    assert!(fields[0].is_static());
    let field_id = dex.get_field_id(fields[0].index).unwrap();
    assert_eq!(dex.get_field_name(field_id).unwrap(), "x");
    assert_eq!(dex.get_field_type_descriptor(field_id).unwrap(), "I");

    let methods: Vec<_> = accessor.get_methods().unwrap().collect();
    assert_eq!(methods.len(), 1);
    let method = &methods[0];
    assert_eq!(method.index, 0);
    assert!(method.is_direct);
    assert_eq!(method.get_direct_invoke_type(), InvokeType::Static);
    assert_ne!(method.code_offset, 0);

    // the code item holds exactly one return-void
    let code_accessor = dex.get_code_item_accessor(method.code_offset).unwrap();
    assert_eq!(code_accessor.registers_size(), 1);
    assert_eq!(code_accessor.ins_size(), 0);
    assert_eq!(code_accessor.outs_size(), 0);
    assert_eq!(code_accessor.tries_size(), 0);
    assert_eq!(code_accessor.insns(), &[0x000E]);
    assert!(code_accessor.has_code());

    // static value initializer decodes to int 7
    let values: Vec<_> = dex
        .get_encoded_static_values(class_def)
        .unwrap()
        .expect("static values")
        .collect::<dexview::Result<_>>()
        .unwrap();
    assert_eq!(values, vec![EncodedValue::Int(7)]);

    // no debug info attached
    let code_item = dex.get_code_item(method.code_offset).unwrap().unwrap();
    assert_eq!(dex.get_line_num_from_pc(Some(code_item), 0).unwrap(), -1);
}

#[test]
fn test_code_offset_zero_is_native_or_abstract() {
    let bytes = one_class_image();
    let image = AlignedImage::new(&bytes);
    let dex = DexFile::from_raw_parts(&image, DexLocation::InMemory).unwrap();
    assert!(dex.get_code_item(0).unwrap().is_none());
}

/// Member indices are delta-coded within each sub-sequence, with a fresh
/// accumulator per sub-sequence.
fn multi_member_image() -> Vec<u8> {
    let mut builder = DexBuilder::new();
    let s_int = builder.string("I"); // 0
    let s_c = builder.string("LC;"); // 1
    let s_void = builder.string("V"); // 2
    let s_a = builder.string("a"); // 3
    let s_b = builder.string("b"); // 4
    let s_c2 = builder.string("c"); // 5
    let s_m = builder.string("m"); // 6
    let s_n = builder.string("n"); // 7

    let t_int = builder.type_id(s_int); // 0
    let t_c = builder.type_id(s_c); // 1
    let t_void = builder.type_id(s_void); // 2

    let p_v = builder.proto(s_void, t_void, &[]);

    // field ids: a, b, c on LC;
    let f_a = builder.field(t_c, t_int, s_a); // 0
    let f_b = builder.field(t_c, t_int, s_b); // 1
    let f_c = builder.field(t_c, t_int, s_c2); // 2

    let m_m = builder.method(t_c, p_v, s_m); // 0
    let m_n = builder.method(t_c, p_v, s_n); // 1

    builder.class(ClassDefDef {
        class_idx: t_c,
        class_data: Some(ClassDataDef {
            // static fields b and c: deltas 1, 1
            static_fields: vec![
                FieldDef {
                    field_idx: f_b,
                    access_flags: ACC_STATIC,
                },
                FieldDef {
                    field_idx: f_c,
                    access_flags: ACC_STATIC,
                },
            ],
            // instance field a: a smaller index proves the accumulator reset
            instance_fields: vec![FieldDef {
                field_idx: f_a,
                access_flags: ACC_PUBLIC,
            }],
            direct_methods: vec![MethodDef {
                method_idx: m_n,
                access_flags: ACC_STATIC,
                code: None,
            }],
            virtual_methods: vec![MethodDef {
                method_idx: m_m,
                access_flags: ACC_PUBLIC,
                code: None,
            }],
            ..Default::default()
        }),
        ..Default::default()
    });
    builder.build()
}

#[test]
fn test_member_visit_count_and_order() {
    let bytes = multi_member_image();
    let image = AlignedImage::new(&bytes);
    let dex = DexFile::from_raw_parts(&image, DexLocation::InMemory).unwrap();

    let class_def = dex.find_class_def("LC;").unwrap();
    let accessor = dex.get_class_accessor(class_def).unwrap().unwrap();

    let visited = std::cell::Cell::new(0usize);
    accessor
        .visit_fields_and_methods(
            |field| {
                visited.set(visited.get() + 1);
                assert!(field.is_static());
                Ok(())
            },
            |field| {
                visited.set(visited.get() + 1);
                assert!(!field.is_static());
                Ok(())
            },
            |method| {
                visited.set(visited.get() + 1);
                assert!(method.is_direct);
                Ok(())
            },
            |method| {
                visited.set(visited.get() + 1);
                assert!(!method.is_direct);
                Ok(())
            },
        )
        .unwrap();
    assert_eq!(
        visited.get(),
        accessor.num_fields() + accessor.num_methods()
    );
}

#[test]
fn test_member_indices_reset_per_subsequence() {
    let bytes = multi_member_image();
    let image = AlignedImage::new(&bytes);
    let dex = DexFile::from_raw_parts(&image, DexLocation::InMemory).unwrap();

    let class_def = dex.find_class_def("LC;").unwrap();
    let accessor = dex.get_class_accessor(class_def).unwrap().unwrap();

    let static_indices: Vec<u32> = accessor.get_static_fields().map(|f| f.index).collect();
    assert_eq!(static_indices, vec![1, 2]);

    // the instance array restarts from a fresh accumulator
    let instance_indices: Vec<u32> = accessor.get_instance_fields().map(|f| f.index).collect();
    assert_eq!(instance_indices, vec![0]);

    let direct_indices: Vec<u32> =
        accessor.get_direct_methods().unwrap().map(|m| m.index).collect();
    assert_eq!(direct_indices, vec![1]);

    let virtual_indices: Vec<u32> =
        accessor.get_virtual_methods().unwrap().map(|m| m.index).collect();
    assert_eq!(virtual_indices, vec![0]);

    // within each sub-sequence the indices are non-decreasing and in range
    for window in static_indices.windows(2) {
        assert!(window[0] <= window[1]);
    }
    for &idx in static_indices.iter().chain(&instance_indices) {
        assert!(idx < dex.num_field_ids());
    }
    for &idx in direct_indices.iter().chain(&virtual_indices) {
        assert!(idx < dex.num_method_ids());
    }
}

#[test]
fn test_virtual_invoke_classification() {
    let bytes = multi_member_image();
    let image = AlignedImage::new(&bytes);
    let dex = DexFile::from_raw_parts(&image, DexLocation::InMemory).unwrap();

    let class_def = dex.find_class_def("LC;").unwrap();
    let accessor = dex.get_class_accessor(class_def).unwrap().unwrap();

    let virtual_method = accessor.get_virtual_methods().unwrap().next().unwrap();
    assert_eq!(
        virtual_method.get_virtual_invoke_type(class_def.access_flags),
        InvokeType::Virtual
    );
}
