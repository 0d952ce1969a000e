use crate::il;
use crate::Error;
use std::collections::BTreeSet;

/// Replace every instruction outside the slice with `Nop`.
///
/// An instruction is live when every bytecode offset it was decompiled from
/// is in `live_offsets`. Synthetic instructions are always live. Entry
/// points keep their returns and throws, so a sliced callback still exits
/// the way it did.
pub fn apply_slice(
    method: &il::Method,
    live_offsets: &BTreeSet<u32>,
    is_entry_point: bool,
) -> Result<il::Method, Error> {
    let mut sliced = method.clone();
    let signature = method.signature();
    let body = sliced.body_mut().ok_or(Error::NoBody(signature))?;

    let mut removed = 0;
    for index in 0..body.blocks().len() {
        for instruction in body.block_mut(index)?.instructions_mut() {
            let live = instruction
                .offsets()
                .iter()
                .all(|offset| live_offsets.contains(offset));
            if live || (is_entry_point && instruction.operation().is_unwind()) {
                continue;
            }
            *instruction.operation_mut() = il::Operation::Nop;
            removed += 1;
        }
    }
    trace!("{}: {} instructions sliced away", method.signature(), removed);

    Ok(sliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn operations(method: &Method) -> Vec<String> {
        method
            .body()
            .unwrap()
            .locations()
            .into_iter()
            .map(|(_, instruction)| instruction.operation().to_string())
            .collect()
    }

    #[test]
    fn dead_instructions_become_nops() {
        // IL_0000: stloc a(ldc.i4 1)
        // IL_0001: stloc x(call GetAxis("Horizontal"))
        // IL_0002: leave
        let a = Variable::local("a", Type::Int32);
        let x = Variable::local("x", Type::Single);
        let get_axis = MethodRef::static_(
            "UnityEngine.Input",
            "GetAxis",
            vec![Type::String],
            Type::Single,
        );
        let mut body = Body::new();
        let block = body.new_block();
        body.emit(block, Operation::stloc(&a, ldc_i4(1))).unwrap();
        body.emit(block, Operation::stloc(&x, call(get_axis, vec![ldstr("Horizontal")])))
            .unwrap();
        body.emit(block, Operation::ret()).unwrap();
        let method = Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build();

        let live: BTreeSet<u32> = vec![1].into_iter().collect();
        let entry = apply_slice(&method, &live, true).unwrap();
        let entry = operations(&entry);
        assert_eq!(entry[0], "nop");
        assert_ne!(entry[1], "nop");
        assert_ne!(entry[2], "nop");

        let helper = operations(&apply_slice(&method, &live, false).unwrap());
        assert_eq!(helper[2], "nop");
    }
}
