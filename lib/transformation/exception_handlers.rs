use crate::il;
use crate::Error;

/// Take the branch which leaves the protected region ending at `block`.
fn take_exit(body: &mut il::Body, block: usize) -> Result<Option<il::Instruction>, Error> {
    let instructions = body.block_mut(block)?.instructions_mut();
    let exits = instructions
        .last()
        .map(|instruction| instruction.operation().is_branch())
        .unwrap_or(false);
    Ok(if exits { instructions.pop() } else { None })
}

/// Strip the exception handlers of `method`.
///
/// Catch, fault and filter handlers are removed together with the branch
/// leaving their protected region, so the region falls through to the code
/// after the handler. Finally handlers stay inline: the protected region
/// falls into the handler, whose `endfinally` becomes the region's exit
/// branch.
pub fn remove_exception_handlers(method: &il::Method) -> Result<il::Method, Error> {
    let mut method = method.clone();
    let signature = method.signature();
    let body = method.body_mut().ok_or(Error::NoBody(signature.clone()))?;
    let handlers = body.exception_handlers().to_vec();
    if handlers.is_empty() {
        return Ok(method);
    }

    let mut removed: Vec<usize> = Vec::new();
    for handler in &handlers {
        let (_, try_end) = handler.try_blocks;
        let (handler_start, handler_end) = handler.handler_blocks;
        if handler_start > handler_end || try_end >= handler_start {
            return Err(Error::Custom(format!(
                "{}: unexpected exception handler shape {:?}",
                signature, handler
            )));
        }
        let exit = take_exit(body, try_end)?;

        match handler.kind {
            il::HandlerKind::Catch | il::HandlerKind::Fault | il::HandlerKind::Filter => {
                removed.extend(handler_start..=handler_end);
            }
            il::HandlerKind::Finally => {
                let instructions = body.block_mut(handler_end)?.instructions_mut();
                let ends_in_endfinally = matches!(
                    instructions.last().map(|instruction| instruction.operation()),
                    Some(il::Operation::EndFinally)
                );
                if !ends_in_endfinally {
                    return Err(Error::Custom(format!(
                        "{}: finally handler does not end in endfinally",
                        signature
                    )));
                }
                instructions.pop();
                if let Some(exit) = exit {
                    instructions.push(exit);
                }
            }
        }
    }

    removed.sort_unstable();
    removed.dedup();
    debug!(
        "{}: removed {} handlers, {} blocks",
        signature,
        handlers.len(),
        removed.len()
    );
    body.clear_exception_handlers();
    body.remove_blocks(&removed);
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    fn operations(method: &Method) -> Vec<Vec<String>> {
        method
            .body()
            .unwrap()
            .blocks()
            .iter()
            .map(|block| {
                block
                    .instructions()
                    .iter()
                    .map(|instruction| instruction.operation().to_string())
                    .collect()
            })
            .collect()
    }

    fn log(message: &str) -> Operation {
        Operation::call(
            MethodRef::static_("UnityEngine.Debug", "Log", vec![Type::String], Type::Void),
            vec![ldstr(message)],
        )
    }

    fn method(body: Body) -> Method {
        Method::builder("Game.Player", "Update")
            .module("Game")
            .body(body)
            .build()
    }

    /// try { Log("a"); } catch { Log("b"); } finally { Log("c"); } Log("d");
    fn with_handlers() -> Method {
        let mut body = Body::new();
        let protected = body.new_block();
        let catch = body.new_block();
        let finally = body.new_block();
        let after = body.new_block();
        body.emit(protected, log("a")).unwrap();
        body.emit(protected, Operation::branch(after)).unwrap();
        body.emit(catch, log("b")).unwrap();
        body.emit(catch, Operation::branch(after)).unwrap();
        body.emit(finally, log("c")).unwrap();
        body.emit(finally, Operation::EndFinally).unwrap();
        body.emit(after, log("d")).unwrap();
        body.emit(after, Operation::ret()).unwrap();
        body.add_exception_handler(ExceptionHandler {
            kind: HandlerKind::Catch,
            try_blocks: (protected, protected),
            handler_blocks: (catch, catch),
        });
        body.add_exception_handler(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_blocks: (protected, catch),
            handler_blocks: (finally, finally),
        });
        method(body)
    }

    /// Log("a"); Log("c"); Log("d");
    fn without_handlers() -> Method {
        let mut body = Body::new();
        let protected = body.new_block();
        let finally = body.new_block();
        let after = body.new_block();
        body.emit(protected, log("a")).unwrap();
        body.emit(finally, log("c")).unwrap();
        body.emit(finally, Operation::branch(after)).unwrap();
        body.emit(after, log("d")).unwrap();
        body.emit(after, Operation::ret()).unwrap();
        method(body)
    }

    #[test]
    fn try_catch_finally_matches_the_handwritten_method() {
        let transformed = remove_exception_handlers(&with_handlers()).unwrap();
        assert!(transformed.body().unwrap().exception_handlers().is_empty());
        assert_eq!(operations(&transformed), operations(&without_handlers()));
    }

    #[test]
    fn finally_without_endfinally_is_rejected() {
        let mut body = Body::new();
        let protected = body.new_block();
        let finally = body.new_block();
        body.emit(protected, log("a")).unwrap();
        body.emit(finally, log("c")).unwrap();
        body.add_exception_handler(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_blocks: (protected, protected),
            handler_blocks: (finally, finally),
        });
        assert!(matches!(
            remove_exception_handlers(&method(body)),
            Err(Error::Custom(_))
        ));
    }
}
