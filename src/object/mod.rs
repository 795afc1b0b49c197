pub mod store;

pub use store::{
    decode_commit, decode_entity, decode_entity_list, decode_tag, decode_tree, encode_commit,
    encode_entity, encode_entity_list, encode_tag, encode_tree, has, object_path, read,
    read_blob, read_commit, read_entity, read_entity_list, read_tag, read_tree, write,
    write_blob, write_commit, write_entity, write_entity_list, write_tag, write_tree,
};
