//! Static protocol reference returned by `get_docs`.

pub const PROTOCOL_DOCS: &str = r#"Mudra Band daemon protocol
==========================

Surfaces
--------
- WebSocket  GET /ws        bidirectional commands + pushed events
- HTTP       GET /api/status, GET /api/docs
- RPC        POST /rpc      one command per request body; optional "session"
                            field names a persistent subscription session;
                            {"command":"poll_events"} drains queued events

Commands (one JSON object per message)
--------------------------------------
{"command":"subscribe","signal":"<signal>"}
{"command":"unsubscribe","signal":"<signal>"}
{"command":"get_subscriptions"}
{"command":"enable","feature":"<signal>"}
{"command":"disable","feature":"<signal>"}
{"command":"get_status"}
{"command":"get_docs"}
{"command":"trigger_gesture","data":{"type":"tap|double_tap|twist|double_twist","confidence":0.0-1.0}}

Exactly one signal per command; a "signals" array is rejected as
malformed_message.

Signals
-------
gesture     {"type":"tap|double_tap|twist|double_twist","confidence":0..1,"timestamp":us}
pressure    {"value":0-100,"normalized":0..1,"timestamp":us}
imu_acc     {"timestamp":us,"values":[x,y,z],"frequency":hz}     ~100 Hz
imu_gyro    {"timestamp":us,"values":[x,y,z],"frequency":hz}     ~100 Hz
navigation  {"delta_x":int,"delta_y":int,"timestamp":us}
snc         {"values":[-1..1,...],"frequency":hz,"timestamp":us}  500 Hz
battery     {"level":0-100,"charging":bool,"timestamp":us}
button      {"state":"pressed|released","timestamp":us}

Every event is wrapped as {"type":"<signal>","data":{...},"timestamp":us}.
connection_status events ({"status":"connected|disconnected","message":...})
are broadcast to every client regardless of subscriptions.

Compatibility
-------------
navigation is mutually exclusive with imu_acc and imu_gyro, across all
clients. Everything else combines freely. Conflicts are reported as
{"type":"error","error":"conflict","conflict_with":"<signal>","message":...}.

Errors
------
invalid_command | invalid_signal | invalid_feature | conflict |
malformed_message | invalid_gesture_type
"#;
