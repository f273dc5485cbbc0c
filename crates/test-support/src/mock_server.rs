//! A scripted MCP-style tool server for exercising [`fsm_rt_bridge`] and
//! [`fsm_rt_cache`] against a real child process, the way
//! `fsm-rt-bridge`'s own `cat_config` test helper exercises the bridge
//! against a trivial echo shell script — this one understands enough of
//! the protocol (spec §4.3, §4.4) to drive the `tools/list` /
//! `tools/call` / `notifications/*` round trip end to end:
//!
//! - `tools/list` replies with `echo` and `add`, then (on its second call)
//!   also `sub`, so a cache-refresh test can observe the list changing.
//! - `tools/call` computes `add`/`sub` over `{a,b}` or echoes `{text}`.
//! - `debug/trigger_list_changed` replies, then emits an unsolicited
//!   `notifications/tools/list_changed` — a test's hook for exercising
//!   spec §8 scenario S4 without waiting on a real external change.
//! - anything else gets a JSON-RPC `-32601` method-not-found error.

/// Returns `(command, args)` to spawn the mock server with
/// [`fsm_rt_bridge::config::BridgeConfig`].
pub fn echo_server_script() -> (&'static str, Vec<&'static str>) {
    (
        "sh",
        vec![
            "-c",
            r#"
list_calls=0
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([^,}]*\).*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
      ;;
    notifications/initialized)
      ;;
    tools/list)
      list_calls=$((list_calls+1))
      echo_tool='{"name":"echo","description":"echoes text","inputSchema":{"kind":"map","closed":true,"entries":[{"key":"text","optional":false,"schema":{"kind":"string"}}]}}'
      add_tool='{"name":"add","description":"adds two integers","inputSchema":{"kind":"map","closed":true,"entries":[{"key":"a","optional":false,"schema":{"kind":"int"}},{"key":"b","optional":false,"schema":{"kind":"int"}}]}}'
      sub_tool='{"name":"sub","description":"subtracts two integers","inputSchema":{"kind":"map","closed":true,"entries":[{"key":"a","optional":false,"schema":{"kind":"int"}},{"key":"b","optional":false,"schema":{"kind":"int"}}]}}'
      if [ "$list_calls" -eq 1 ]; then
        printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[%s,%s]}}\n' "$id" "$echo_tool" "$add_tool"
      else
        printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[%s,%s,%s]}}\n' "$id" "$echo_tool" "$add_tool" "$sub_tool"
      fi
      ;;
    tools/call)
      name=$(printf '%s' "$line" | sed -n 's/.*"name":"\([^"]*\)".*/\1/p')
      if [ "$name" = "add" ] || [ "$name" = "sub" ]; then
        a=$(printf '%s' "$line" | sed -n 's/.*"a":\([0-9-]*\).*/\1/p')
        b=$(printf '%s' "$line" | sed -n 's/.*"b":\([0-9-]*\).*/\1/p')
        if [ "$name" = "add" ]; then
          result=$((a+b))
        else
          result=$((a-b))
        fi
        printf '{"jsonrpc":"2.0","id":%s,"result":{"sum":%s}}\n' "$id" "$result"
      else
        text=$(printf '%s' "$line" | sed -n 's/.*"text":"\([^"]*\)".*/\1/p')
        printf '{"jsonrpc":"2.0","id":%s,"result":{"text":"%s"}}\n' "$id" "$text"
      fi
      ;;
    debug/trigger_list_changed)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
      printf '{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}\n'
      ;;
    logging/setLevel)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id"
      ;;
  esac
done
"#,
        ],
    )
}
