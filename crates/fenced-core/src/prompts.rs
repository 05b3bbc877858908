// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly (spec.md §4.5 [SKILLS]) and the JS prelude that
//! installs the core-provided globals `Data`, `StreamedData`, `mount`, and
//! the timer stubs (spec.md §4.3) into a session's interpreter.
//!
//! The prelude never touches `fenced_interp::Engine` directly — it is run
//! once, at session construction, as an ordinary code segment through
//! `Interpreter::run()` (see `interpreter_setup.rs`), after the native
//! `__native_*` functions it calls have been registered. This keeps
//! `fenced-interp`'s public surface untouched: everything C5-specific is a
//! JS-side shim over a handful of JSON-in/JSON-out native functions.

use crate::skills::SkillContext;

const BASE_SYSTEM_PROMPT: &str = "\
You are an agent whose entire interface to the world is Markdown. Your \
response is parsed as an ordered sequence of prose and two kinds of fenced \
blocks, executed as they stream in — never wait for your whole response to \
finish before a block starts running.

Prose outside of fences is shown to the user as-is, live, token by token.

```tsx agent.run
// Statements here run one at a time as you stream them.
```

```json agent.data => \"<target-id>\"
{\"JSON streamed into a target you registered earlier via StreamedData(id)\"}
```

Inside a `tsx agent.run` fence, three globals are available:
  - `Data(initial)` creates a reactive record; call `.set(path, value)` and \
`.delete(path)` to mutate it, where `path` is an array of string/number keys.
  - `StreamedData(id)` references a streamed target that a matching \
`json agent.data => \"id\"` fence writes into; read its current value via \
`.value`.
  - `mount(options)` renders a UI panel described by `options.ui` (a \
function), optionally bound to `options.data` and/or `options.streamedData`, \
and returns `{ mountId, result() }` where `result()` returns the user's \
submitted value once available, or `undefined` until then.

Anything your code logs via `console.log`/`console.error` is captured and, \
together with any uncaught error, fed back to you as the next turn's input \
once your response finishes streaming.
";

/// Assemble the system prompt for a session: the base template plus each
/// active skill's snippet, appended in registration order.
pub fn system_prompt(skills: &SkillContext) -> String {
    let mut prompt = BASE_SYSTEM_PROMPT.to_string();
    for snippet in skills.prompt_snippets() {
        if snippet.is_empty() {
            continue;
        }
        prompt.push_str("\n");
        prompt.push_str(snippet);
        prompt.push('\n');
    }
    prompt
}

/// JS prelude run once per session, before any user turn, via
/// `Interpreter::run()`. Installs `Data`, `StreamedData`, `mount`, the timer
/// stubs, and the callback dispatch entry point `__dispatchCallback` that
/// `interaction.rs` invokes on `Inbound::CallbackInvoke`.
///
/// Timer stubs are a deliberate simplification (DESIGN.md's Open Question
/// decisions): there is no real event loop backing this interpreter, so
/// `setTimeout`/`queueMicrotask` run their callback immediately, once,
/// synchronously; `setInterval` also fires its callback exactly once
/// (firing forever inline would hang the run) and its id can be passed to
/// `clearInterval`, which is a no-op.
pub const JS_PRELUDE: &str = r#"
globalThis.__fenced_callbacks = {};

globalThis.Data = function (initial) {
    const id = __native_data_wrap(initial === undefined ? null : initial);
    return {
        __dataId: id,
        get(path) { return __native_data_get(id, path || []); },
        set(path, value) { __native_data_set(id, path, value); },
        delete(path) { __native_data_delete(id, path || []); },
    };
};

globalThis.StreamedData = function (id) {
    __native_streamed_register(id);
    return {
        __streamedId: id,
        get value() { return __native_streamed_get(id); },
    };
};

globalThis.mount = function (options) {
    options = options || {};
    const callbacks = options.callbacks || {};
    const mountId = __native_mount_register(JSON.stringify({
        uiSource: String(options.ui || (() => {})),
        dataId: options.data ? options.data.__dataId : null,
        streamedDataId: options.streamedData ? options.streamedData.__streamedId : null,
        outputSchema: options.outputSchema || {},
        callbackNames: Object.keys(callbacks),
    }));
    globalThis.__fenced_callbacks[mountId] = callbacks;
    return {
        mountId,
        result() { return __native_mount_result(mountId); },
    };
};

globalThis.__dispatchCallback = function (mountId, name, args) {
    const callbacks = globalThis.__fenced_callbacks[mountId];
    if (!callbacks || typeof callbacks[name] !== "function") {
        return;
    }
    callbacks[name].apply(null, args || []);
};

globalThis.setTimeout = function (fn, _delay) {
    const extra = Array.prototype.slice.call(arguments, 2);
    if (typeof fn === "function") { fn.apply(null, extra); }
    return 0;
};
globalThis.clearTimeout = function () {};

globalThis.setInterval = function (fn, _delay) {
    const extra = Array.prototype.slice.call(arguments, 2);
    if (typeof fn === "function") { fn.apply(null, extra); }
    return 0;
};
globalThis.clearInterval = function () {};

globalThis.queueMicrotask = function (fn) {
    if (typeof fn === "function") { fn(); }
};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::Skill;

    #[test]
    fn base_prompt_mentions_core_globals() {
        let prompt = system_prompt(&SkillContext::new());
        assert!(prompt.contains("Data("));
        assert!(prompt.contains("StreamedData("));
        assert!(prompt.contains("mount("));
    }

    #[test]
    fn skill_snippets_are_appended_in_order() {
        let skills = SkillContext::new()
            .with_skill(Skill {
                name: "one".into(),
                prompt_snippet: "SNIPPET_ONE".into(),
                globals: vec![],
            })
            .with_skill(Skill {
                name: "two".into(),
                prompt_snippet: "SNIPPET_TWO".into(),
                globals: vec![],
            });
        let prompt = system_prompt(&skills);
        let one = prompt.find("SNIPPET_ONE").unwrap();
        let two = prompt.find("SNIPPET_TWO").unwrap();
        assert!(one < two);
    }

    #[test]
    fn prelude_defines_expected_globals() {
        for name in ["Data", "StreamedData", "mount", "__dispatchCallback", "setTimeout", "setInterval"] {
            assert!(JS_PRELUDE.contains(&format!("globalThis.{name}")), "missing {name}");
        }
    }
}
